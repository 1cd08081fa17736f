use serde::Serialize;
use std::time::Duration;

use crate::protocol::{AnimationDirective, AudioVisemes, ExpressionSet, ResponsePart};

/// Parts received so far for one correlation id
#[derive(Debug, Clone)]
pub struct PendingBundle {
    correlation_id: String,
    received_at: Duration,
    audio_at: Option<Duration>,
    audio: Option<AudioVisemes>,
    expressions: Option<ExpressionSet>,
    animation: Option<AnimationDirective>,
}

impl PendingBundle {
    pub fn new(correlation_id: String, now: Duration) -> Self {
        Self {
            correlation_id,
            received_at: now,
            audio_at: None,
            audio: None,
            expressions: None,
            animation: None,
        }
    }

    /// Store a part in its slot. Returns true if a previous part of the same
    /// kind was replaced (last write wins).
    pub fn store(&mut self, part: ResponsePart, now: Duration) -> bool {
        match part {
            ResponsePart::AudioVisemes(p) => {
                self.audio_at.get_or_insert(now);
                self.audio.replace(p).is_some()
            }
            ResponsePart::Expressions(p) => self.expressions.replace(p).is_some(),
            ResponsePart::Animation(p) => self.animation.replace(p).is_some(),
        }
    }

    /// Playable once the audio part is present
    pub fn is_complete(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_fully_enriched(&self) -> bool {
        self.audio.is_some() && self.expressions.is_some() && self.animation.is_some()
    }

    pub fn received_at(&self) -> Duration {
        self.received_at
    }

    pub fn audio_at(&self) -> Option<Duration> {
        self.audio_at
    }

    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.received_at)
    }

    pub fn status(&self, now: Duration) -> BundleStatus {
        BundleStatus {
            correlation_id: self.correlation_id.clone(),
            has_audio: self.audio.is_some(),
            has_expressions: self.expressions.is_some(),
            has_animation: self.animation.is_some(),
            is_complete: self.is_complete(),
            age_ms: self.age(now).as_millis() as u64,
        }
    }

    /// Consume into a playable bundle; `None` when audio is missing
    pub fn into_complete(self, now: Duration) -> Option<CompleteBundle> {
        let completion_latency = self.age(now);
        Some(CompleteBundle {
            correlation_id: self.correlation_id,
            audio: self.audio?,
            expressions: self.expressions,
            animation: self.animation,
            completion_latency,
        })
    }
}

/// Presence flags of a pending bundle, for introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleStatus {
    pub correlation_id: String,
    pub has_audio: bool,
    pub has_expressions: bool,
    pub has_animation: bool,
    pub is_complete: bool,
    pub age_ms: u64,
}

/// A reply ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteBundle {
    pub correlation_id: String,
    pub audio: AudioVisemes,
    pub expressions: Option<ExpressionSet>,
    pub animation: Option<AnimationDirective>,
    /// Time from the first part's arrival to emission
    pub completion_latency: Duration,
}
