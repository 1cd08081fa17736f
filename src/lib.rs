pub mod aggregator;
pub mod avatar;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod nats;
pub mod protocol;
pub mod services;

pub use aggregator::{AggregatorConfig, AggregatorStats, CompleteBundle, ResponseAggregator};
pub use avatar::{AvatarRuntime, PoseState, RuntimeConfig, RuntimeStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::AvatarError;
pub use events::{AvatarEvents, EventBus, PlaybackEvent, PoseChange, Subscription};
pub use http::{create_router, AppState};
pub use nats::{NatsClient, UtteranceSink};
pub use protocol::{classify, Inbound, ResponsePart};
