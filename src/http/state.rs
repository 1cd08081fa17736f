use crate::avatar::AvatarRuntime;
use crate::nats::UtteranceSink;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Avatar session shared between the tick loop and the HTTP handlers
pub type SharedRuntime = Arc<Mutex<AvatarRuntime>>;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: SharedRuntime,

    /// Reply-service connection; `None` when NATS is disabled
    pub sink: Option<Arc<dyn UtteranceSink>>,
}

impl AppState {
    pub fn new(runtime: SharedRuntime) -> Self {
        Self {
            runtime,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn UtteranceSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}
