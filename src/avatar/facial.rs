// Facial channel envelopes
//
// Every change to a facial channel (visemes, expressions, blink, the pose
// smile) runs through an envelope of ease-out cubic ramps and holds. One
// envelope per channel; starting a new one replaces the old (last writer
// wins), which is also how a stopped timeline cancels its in-flight fades.

use std::collections::{HashMap, VecDeque};
use tracing::warn;

use crate::error::AvatarError;
use crate::services::Rig;

/// Ease-out cubic on [0, 1]
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Ramp { to: f32, secs: f64 },
    Hold { secs: f64 },
}

/// A queued sequence of ramps and holds for one channel
#[derive(Debug, Clone)]
pub struct ChannelEnvelope {
    stages: VecDeque<Stage>,
    stage_from: f32,
    stage_elapsed: f64,
    value: f32,
}

impl ChannelEnvelope {
    /// Single ramp from `from` to `to`
    pub fn ramp(from: f32, to: f32, secs: f64) -> Self {
        Self::with_stages(from, [Stage::Ramp { to, secs }])
    }

    /// Ramp up to `peak`, hold, ramp back to zero
    pub fn pulse(from: f32, peak: f32, attack: f64, hold: f64, release: f64) -> Self {
        Self::with_stages(
            from,
            [
                Stage::Ramp { to: peak, secs: attack },
                Stage::Hold { secs: hold },
                Stage::Ramp { to: 0.0, secs: release },
            ],
        )
    }

    fn with_stages<I: IntoIterator<Item = Stage>>(from: f32, stages: I) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            stage_from: from,
            stage_elapsed: 0.0,
            value: from,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_finished(&self) -> bool {
        self.stages.is_empty()
    }

    /// Advance by `dt` seconds, carrying leftover time across stage
    /// boundaries, and return the new value.
    pub fn advance(&mut self, dt: f64) -> f32 {
        let mut remaining = dt.max(0.0);

        while let Some(stage) = self.stages.front().copied() {
            self.stage_elapsed += remaining;
            let secs = match stage {
                Stage::Ramp { secs, .. } | Stage::Hold { secs } => secs,
            };
            let progress = if secs <= 0.0 {
                1.0
            } else {
                (self.stage_elapsed / secs).min(1.0)
            };

            if let Stage::Ramp { to, .. } = stage {
                let eased = ease_out_cubic(progress) as f32;
                self.value = self.stage_from + (to - self.stage_from) * eased;
            }

            if progress < 1.0 {
                break;
            }

            remaining = (self.stage_elapsed - secs).max(0.0);
            self.stages.pop_front();
            self.stage_from = self.value;
            self.stage_elapsed = 0.0;
        }

        self.value
    }
}

/// Active envelopes of all facial channels of one model
#[derive(Debug, Default)]
pub struct FacialChannels {
    active: HashMap<String, ChannelEnvelope>,
}

impl FacialChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ease the channel from its current value to `target`
    pub fn ramp(
        &mut self,
        rig: &dyn Rig,
        channel: &str,
        target: f32,
        secs: f64,
    ) -> Result<(), AvatarError> {
        let from = self.current(rig, channel)?;
        self.active.insert(
            channel.to_string(),
            ChannelEnvelope::ramp(from, target.clamp(0.0, 1.0), secs),
        );
        Ok(())
    }

    /// Ease up to `peak`, hold, ease back to zero
    pub fn pulse(
        &mut self,
        rig: &dyn Rig,
        channel: &str,
        peak: f32,
        attack: f64,
        hold: f64,
        release: f64,
    ) -> Result<(), AvatarError> {
        let from = self.current(rig, channel)?;
        self.active.insert(
            channel.to_string(),
            ChannelEnvelope::pulse(from, peak.clamp(0.0, 1.0), attack, hold, release),
        );
        Ok(())
    }

    /// Replace whatever drives the channel with a fade back to zero
    pub fn release(&mut self, rig: &dyn Rig, channel: &str, secs: f64) {
        if let Err(e) = self.ramp(rig, channel, 0.0, secs) {
            warn!("Cannot release facial channel: {}", e);
        }
    }

    pub fn is_active(&self, channel: &str) -> bool {
        self.active.contains_key(channel)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Advance every envelope and write the values to the rig.
    /// Finished envelopes write their final value once and are dropped.
    pub fn apply(&mut self, dt: f64, rig: &mut dyn Rig) {
        self.active.retain(|channel, envelope| {
            let value = envelope.advance(dt);
            rig.set_channel_value(channel, value);
            !envelope.is_finished()
        });
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    fn current(&self, rig: &dyn Rig, channel: &str) -> Result<f32, AvatarError> {
        if let Some(envelope) = self.active.get(channel) {
            return Ok(envelope.value());
        }
        rig.channel_value(channel)
            .ok_or_else(|| AvatarError::ChannelNotFound(channel.to_string()))
    }
}
