use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;

use crate::avatar::PoseState;
use crate::services::{Bone, Rig, Rotation};

/// Share of the chest signal applied to the spine
pub const SPINE_SHARE: f32 = 0.4;

/// Breathing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathingConfig {
    /// Period of one breath in seconds
    pub duration_secs: f64,

    /// Chest rotation amplitude in radians
    pub chest_expansion: f32,

    pub enabled: bool,
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            duration_secs: 4.0,
            chest_expansion: 0.02,
            enabled: true,
        }
    }
}

/// Partial update, fields left `None` keep their value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreathingUpdate {
    pub duration_secs: Option<f64>,
    pub chest_expansion: Option<f32>,
    pub enabled: Option<bool>,
}

/// Sinusoidal chest/spine motion layered on the rest pose.
///
/// Rest rotations are captured the first time each bone is driven and never
/// re-captured, so the offset cannot accumulate into the pose.
#[derive(Debug, Clone)]
pub struct Breathing {
    config: BreathingConfig,
    rest: HashMap<Bone, f32>,
    offset_applied: bool,
}

impl Breathing {
    pub fn new(config: BreathingConfig) -> Self {
        Self {
            config,
            rest: HashMap::new(),
            offset_applied: false,
        }
    }

    pub fn config(&self) -> &BreathingConfig {
        &self.config
    }

    pub fn apply_update(&mut self, update: &BreathingUpdate) {
        if let Some(duration) = update.duration_secs {
            self.config.duration_secs = duration;
        }
        if let Some(expansion) = update.chest_expansion {
            self.config.chest_expansion = expansion;
        }
        if let Some(enabled) = update.enabled {
            self.config.enabled = enabled;
        }
    }

    /// Chest offset in radians at `time_secs`
    pub fn offset_at(&self, time_secs: f64) -> f32 {
        if self.config.duration_secs <= 0.0 {
            return 0.0;
        }
        let cycle = (time_secs * TAU / self.config.duration_secs).sin() as f32;
        cycle * self.config.chest_expansion
    }

    pub fn update(&mut self, time_secs: f64, state: PoseState, rig: &mut dyn Rig) {
        let active = self.config.enabled && state.breathes() && self.config.duration_secs > 0.0;

        if active {
            let offset = self.offset_at(time_secs);
            for (bone, share) in [(Bone::Chest, 1.0), (Bone::Spine, SPINE_SHARE)] {
                self.write(rig, bone, offset * share);
            }
            self.offset_applied = true;
        } else if self.offset_applied {
            // Put the bones back on their rest rotation once, then leave them
            // to the clip layer.
            let bones: Vec<Bone> = self.rest.keys().copied().collect();
            for bone in bones {
                self.write(rig, bone, 0.0);
            }
            self.offset_applied = false;
        }
    }

    fn write(&mut self, rig: &mut dyn Rig, bone: Bone, offset: f32) {
        let Some(current) = rig.bone_rotation(bone) else {
            return;
        };
        let rest = *self.rest.entry(bone).or_insert(current.x);
        rig.set_bone_rotation(bone, Rotation::new(rest + offset, current.y, current.z));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::HeadlessRig;

    fn chest_x(rig: &HeadlessRig) -> f32 {
        rig.bone_rotation(Bone::Chest).unwrap().x
    }

    #[test]
    fn test_breathes_in_waiting_with_spine_share() {
        let mut rig = HeadlessRig::with_default_channels();
        rig.pose_bone(Bone::Chest, Rotation::new(0.1, 0.0, 0.0));
        let mut breathing = Breathing::new(BreathingConfig::default());

        // Quarter period: sin = 1
        breathing.update(1.0, PoseState::Waiting, &mut rig);
        assert!((chest_x(&rig) - 0.12).abs() < 1e-6);
        let spine = rig.bone_rotation(Bone::Spine).unwrap().x;
        assert!((spine - 0.02 * SPINE_SHARE).abs() < 1e-6);
    }

    #[test]
    fn test_rest_captured_once() {
        let mut rig = HeadlessRig::with_default_channels();
        let mut breathing = Breathing::new(BreathingConfig::default());

        for i in 0..50 {
            breathing.update(i as f64 * 0.37, PoseState::Attention, &mut rig);
        }
        // Full period later the chest is back at rest + 0 offset
        breathing.update(8.0, PoseState::Attention, &mut rig);
        assert!(chest_x(&rig).abs() < 1e-6);
    }

    #[test]
    fn test_offset_zeroed_within_one_tick_outside_breathing_states() {
        let mut rig = HeadlessRig::with_default_channels();
        let mut breathing = Breathing::new(BreathingConfig::default());

        breathing.update(1.0, PoseState::Waiting, &mut rig);
        assert!(chest_x(&rig) > 0.0);

        breathing.update(1.016, PoseState::Thinking, &mut rig);
        assert_eq!(chest_x(&rig), 0.0);
        assert_eq!(rig.bone_rotation(Bone::Spine).unwrap().x, 0.0);

        // And no further writes while outside
        let writes = rig.bone_writes();
        breathing.update(1.032, PoseState::Talking, &mut rig);
        breathing.update(1.048, PoseState::Hello, &mut rig);
        assert_eq!(rig.bone_writes(), writes);
    }

    #[test]
    fn test_disabled_does_not_write() {
        let mut rig = HeadlessRig::with_default_channels();
        let mut breathing = Breathing::new(BreathingConfig::default());
        breathing.apply_update(&BreathingUpdate {
            enabled: Some(false),
            ..Default::default()
        });

        breathing.update(1.0, PoseState::Waiting, &mut rig);
        assert_eq!(rig.bone_writes(), 0);
        assert_eq!(breathing.config().duration_secs, 4.0);
    }
}
