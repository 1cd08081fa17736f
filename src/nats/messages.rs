pub use crate::protocol::{ClientMessage, HEARTBEAT};

/// Utterance for the reply service. A missing id gets a fresh UUID, which
/// becomes the correlation id of the reply parts.
pub fn utterance(message: &str, id: Option<String>) -> ClientMessage {
    ClientMessage {
        message: message.to_string(),
        id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    }
}
