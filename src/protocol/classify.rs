// Structural classification of inbound reply messages.
//
// The reply service sends untagged JSON objects; the kind of each message is
// recovered from which fields are present, never from a type tag.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use super::messages::{
    AnimationDirective, AudioVisemes, ExpressionSet, FastPreview, ServerError, HEARTBEAT,
};

/// Which slot of a pending bundle a part fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    AudioVisemes,
    Expressions,
    AnimationDirective,
}

/// A correlated part of a reply
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    AudioVisemes(AudioVisemes),
    Expressions(ExpressionSet),
    Animation(AnimationDirective),
}

impl ResponsePart {
    pub fn correlation_id(&self) -> &str {
        match self {
            ResponsePart::AudioVisemes(p) => &p.message_id,
            ResponsePart::Expressions(p) => &p.message_id,
            ResponsePart::Animation(p) => &p.message_id,
        }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            ResponsePart::AudioVisemes(_) => PartKind::AudioVisemes,
            ResponsePart::Expressions(_) => PartKind::Expressions,
            ResponsePart::Animation(_) => PartKind::AnimationDirective,
        }
    }
}

/// Result of classifying one inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Heartbeat,
    ServerError(ServerError),
    FastPreview(FastPreview),
    Part(ResponsePart),
    /// Payload could not be decoded, or matched a shape with invalid fields
    Malformed(String),
    /// Valid JSON that matches no known shape
    Unclassified(Value),
}

/// Classify a raw transport payload. Total: never fails, never panics.
pub fn classify(raw: &[u8]) -> Inbound {
    let trimmed = trim_ascii(raw);
    if trimmed == HEARTBEAT.as_bytes() {
        return Inbound::Heartbeat;
    }

    match serde_json::from_slice::<Value>(trimmed) {
        Ok(value) => classify_value(value),
        Err(e) => {
            warn!("Failed to parse inbound message: {}", e);
            Inbound::Malformed(e.to_string())
        }
    }
}

/// Classify an already decoded payload
pub fn classify_value(value: Value) -> Inbound {
    let mut obj = match value {
        Value::String(s) if s == HEARTBEAT => return Inbound::Heartbeat,
        Value::Object(obj) => obj,
        other => {
            warn!("Unclassified inbound message: {}", other);
            return Inbound::Unclassified(other);
        }
    };

    if obj.contains_key("error") && obj.get("type").and_then(Value::as_str) == Some("error") {
        return decode(obj, Inbound::ServerError);
    }

    let has = |obj: &Map<String, Value>, key: &str| obj.get(key).is_some_and(|v| !v.is_null());

    if !has(&obj, "message_id") {
        if has(&obj, "audio_url") || has(&obj, "visemas") || has(&obj, "text") {
            return decode(obj, Inbound::FastPreview);
        }
        let value = Value::Object(obj);
        warn!("Unclassified inbound message: {}", value);
        return Inbound::Unclassified(value);
    }

    normalize_correlation_id(&mut obj);

    if has(&obj, "audio_url") {
        return decode(obj, |p| Inbound::Part(ResponsePart::AudioVisemes(p)));
    }
    if has(&obj, "expresiones") {
        return decode(obj, |p| Inbound::Part(ResponsePart::Expressions(p)));
    }
    if has(&obj, "keyframes") || has(&obj, "vrma_file") {
        return decode(obj, |p| Inbound::Part(ResponsePart::Animation(p)));
    }

    let value = Value::Object(obj);
    warn!("Unclassified inbound message: {}", value);
    Inbound::Unclassified(value)
}

fn decode<T, F>(obj: Map<String, Value>, wrap: F) -> Inbound
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Inbound,
{
    match serde_json::from_value::<T>(Value::Object(obj)) {
        Ok(msg) => wrap(msg),
        Err(e) => {
            warn!("Malformed inbound message: {}", e);
            Inbound::Malformed(e.to_string())
        }
    }
}

// Numeric ids are accepted and treated as their decimal string.
fn normalize_correlation_id(obj: &mut Map<String, Value>) {
    if let Some(Value::Number(n)) = obj.get("message_id") {
        let id = n.to_string();
        obj.insert("message_id".to_string(), Value::String(id));
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
