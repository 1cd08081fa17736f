//! Reply-service wire protocol
//!
//! Message types as they appear on the wire, and the structural classifier
//! that sorts inbound payloads into previews, correlated parts, errors and
//! heartbeats.

mod classify;
pub mod messages;

pub use classify::{classify, classify_value, Inbound, PartKind, ResponsePart};
pub use messages::{
    AnimationDirective, AnimationKeyframe, AnimationSequence, AudioVisemes, ClientMessage,
    Expression, ExpressionSet, FastPreview, ServerError, Viseme, HEARTBEAT,
};
