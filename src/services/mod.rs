//! Collaborator seams
//!
//! The rendering stack, clip cache and audio output live outside this crate.
//! Each is reached through a trait here, with a headless implementation used
//! when nothing else is attached:
//! - `Rig` / `HeadlessRig` - bone rotations and facial channels
//! - `ClipLibrary` / `ClipCatalog` - clip availability, duration, playback
//! - `AudioOutput` / `HeadlessAudio` - audio start, position and end

pub mod audio;
pub mod clips;
pub mod rig;

pub use audio::{AudioOutput, AudioRequest, ClockPlayback, HeadlessAudio, Playback, PlaybackStatus};
pub use clips::{default_clips, ClipCatalog, ClipLibrary, ClipSpec, PlayOptions};
pub use rig::{Bone, HeadlessRig, Rig, Rotation, DEFAULT_CHANNELS};
