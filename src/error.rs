//! Error types for loqa-avatar

use thiserror::Error;

/// Errors raised by the aggregation and performance layers.
///
/// Only `ServerReported` and `AudioPlayback` are surfaced to subscribers;
/// everything else is logged and recovered where it happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AvatarError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unclassified message: {0}")]
    Unclassified(String),

    #[error("Part rejected: empty correlation id")]
    EmptyCorrelationId,

    #[error("Bundle {id} evicted after {age_ms}ms without audio")]
    StaleBundle { id: String, age_ms: u64 },

    #[error("Server error ({kind}): {message}")]
    ServerReported { kind: String, message: String },

    #[error("Facial channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Clip not loaded: {0}")]
    ClipNotLoaded(String),

    #[error("Audio playback failed: {0}")]
    AudioPlayback(String),

    #[error("Invalid audio source: {0}")]
    InvalidAudioSource(String),
}

impl AvatarError {
    /// Whether this error is reported to subscribers rather than only logged.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            AvatarError::ServerReported { .. } | AvatarError::AudioPlayback(_)
        )
    }
}
