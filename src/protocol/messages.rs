use serde::{Deserialize, Serialize};

/// Heartbeat token exchanged in both directions.
pub const HEARTBEAT: &str = "alive";

/// Timed mouth shape, referenced to elapsed audio time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viseme {
    /// Offset in seconds from audio start
    #[serde(rename = "tiempo")]
    pub time: f64,

    /// Facial channel name (e.g. "aa", "ou")
    #[serde(rename = "visema")]
    pub channel: String,
}

/// Timed emotional expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(rename = "expresion")]
    pub channel: String,

    #[serde(rename = "tiempo")]
    pub time: f64,

    /// Target intensity (0.0 to 1.0), if provided
    #[serde(rename = "intensidad", default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationKeyframe {
    pub vrma: String,
    pub duration: f64,
    pub crossfade: f64,
}

/// Body animation descriptor, resolved to a clip by the clip library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationSequence {
    pub sequence: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Multi-keyframe form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyframes: Option<Vec<AnimationKeyframe>>,

    /// Single-file form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrma_file: Option<String>,

    /// Whether procedural breathing may run while this sequence plays
    #[serde(default)]
    pub breathing: bool,

    /// Seconds of audio before the clip starts
    #[serde(default)]
    pub delay: f64,

    /// Play once and fall back to the idle loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary: Option<bool>,
}

impl AnimationSequence {
    /// Clip name this sequence refers to: the file stem of `vrma_file`, or of
    /// the first keyframe.
    pub fn clip_name(&self) -> Option<String> {
        let url = match (&self.vrma_file, &self.keyframes) {
            (Some(file), _) => file.as_str(),
            (None, Some(keyframes)) => keyframes.first()?.vrma.as_str(),
            (None, None) => return None,
        };

        let file = url.rsplit('/').next().unwrap_or(url);
        let name = file.strip_suffix(".vrma").unwrap_or(file);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Crossfade in seconds, taken from the first keyframe when present
    pub fn crossfade(&self) -> Option<f64> {
        self.keyframes
            .as_ref()
            .and_then(|k| k.first())
            .map(|k| k.crossfade)
    }
}

/// Low-latency preview, played as soon as it arrives (no message_id)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastPreview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visemas: Option<Vec<Viseme>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Audio + lip-sync part of a correlated reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioVisemes {
    pub message_id: String,
    pub audio_url: String,
    #[serde(default)]
    pub visemas: Vec<Viseme>,
}

/// Expression part of a correlated reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSet {
    pub message_id: String,
    pub expresiones: Vec<Expression>,
}

/// Animation part of a correlated reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationDirective {
    pub message_id: String,
    #[serde(flatten)]
    pub sequence: AnimationSequence,
}

/// Error reported by the reply service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub error: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Utterance sent to the reply service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub message: String,
    pub id: String,
}
