//! HTTP control API for the avatar session
//!
//! Endpoints:
//! - GET /avatar/status - Pose, playback and pending bundles
//! - POST /avatar/attention - User started speaking
//! - POST /avatar/thinking - Reply is being generated
//! - POST /avatar/idle - End the current performance
//! - POST /avatar/breathing - Update breathing parameters
//! - POST /avatar/utterance - Send a message to the reply service
//! - POST /avatar/inbound - Inject a raw reply-service message
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{UtteranceRequest, UtteranceResponse};
pub use routes::create_router;
pub use state::{AppState, SharedRuntime};
