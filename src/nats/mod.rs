pub mod client;
pub mod messages;

pub use client::{pump_responses, run_heartbeat, NatsClient, UtteranceSink};
pub use messages::utterance;
