use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Humanoid bones the procedural layer writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bone {
    Head,
    Neck,
    Chest,
    Spine,
    LeftEye,
    RightEye,
}

/// Euler rotation in radians
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Rotation {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, by: Rotation) -> Rotation {
        Rotation::new(self.x + by.x, self.y + by.y, self.z + by.z)
    }
}

/// The skinned model as seen by the animation core: bone rotations and
/// facial blend channels.
///
/// Implemented by the rendering stack. Writes are made from the animation
/// tick only, in the order clip pose, procedural offsets, facial channels.
pub trait Rig: Send {
    fn bone_rotation(&self, bone: Bone) -> Option<Rotation>;

    /// Returns false when the model has no such bone
    fn set_bone_rotation(&mut self, bone: Bone, rotation: Rotation) -> bool;

    fn has_channel(&self, name: &str) -> bool;

    fn channel_value(&self, name: &str) -> Option<f32>;

    /// Returns false when the model has no such channel
    fn set_channel_value(&mut self, name: &str, value: f32) -> bool;
}

/// Default facial channels of a VRM-style model
pub const DEFAULT_CHANNELS: &[&str] = &[
    "aa", "ih", "ou", "ee", "oh", "neutral", "blink", "happy", "angry", "sad", "relaxed",
    "surprised",
];

/// In-memory rig used when no renderer is attached, and in tests.
///
/// Counts bone writes so callers can observe when a layer stops driving the
/// skeleton.
#[derive(Debug, Clone, Default)]
pub struct HeadlessRig {
    bones: HashMap<Bone, Rotation>,
    channels: HashMap<String, f32>,
    bone_writes: u64,
}

impl HeadlessRig {
    /// Full humanoid at rest with the given facial channels
    pub fn humanoid<S: AsRef<str>>(channels: &[S]) -> Self {
        let bones = [
            Bone::Head,
            Bone::Neck,
            Bone::Chest,
            Bone::Spine,
            Bone::LeftEye,
            Bone::RightEye,
        ]
        .into_iter()
        .map(|b| (b, Rotation::default()))
        .collect();

        Self {
            bones,
            channels: channels
                .iter()
                .map(|c| (c.as_ref().to_string(), 0.0))
                .collect(),
            bone_writes: 0,
        }
    }

    pub fn with_default_channels() -> Self {
        Self::humanoid(DEFAULT_CHANNELS)
    }

    /// Total successful bone writes since construction
    pub fn bone_writes(&self) -> u64 {
        self.bone_writes
    }

    /// Pose a bone as if the clip layer had written it (not counted)
    pub fn pose_bone(&mut self, bone: Bone, rotation: Rotation) {
        self.bones.insert(bone, rotation);
    }
}

impl Rig for HeadlessRig {
    fn bone_rotation(&self, bone: Bone) -> Option<Rotation> {
        self.bones.get(&bone).copied()
    }

    fn set_bone_rotation(&mut self, bone: Bone, rotation: Rotation) -> bool {
        match self.bones.get_mut(&bone) {
            Some(slot) => {
                *slot = rotation;
                self.bone_writes += 1;
                true
            }
            None => false,
        }
    }

    fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    fn channel_value(&self, name: &str) -> Option<f32> {
        self.channels.get(name).copied()
    }

    fn set_channel_value(&mut self, name: &str, value: f32) -> bool {
        match self.channels.get_mut(name) {
            Some(slot) => {
                *slot = value.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }
}
