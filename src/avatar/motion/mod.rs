//! Procedural motion generators
//!
//! Continuous signals layered on top of the clip pose each tick. Breathing
//! and gaze are gated by pose state; blink runs in every state.

pub mod blink;
pub mod breathing;
pub mod gaze;

pub use blink::{Blink, BlinkConfig};
pub use breathing::{Breathing, BreathingConfig, BreathingUpdate, SPINE_SHARE};
pub use gaze::{
    sample_thinking_pose, GazeConfig, GazeDirection, GazePose, GazeWander, ThinkingPose,
    WanderTarget,
};
