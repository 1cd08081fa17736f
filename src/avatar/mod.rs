//! Avatar performance
//!
//! Pose state machine, procedural motion, facial channel envelopes and the
//! timeline player, tied together by `AvatarRuntime`.

pub mod facial;
pub mod motion;
pub mod pose;
pub mod runtime;
pub mod timeline;

pub use facial::{ease_out_cubic, ChannelEnvelope, FacialChannels};
pub use pose::{PoseConfig, PoseEffect, PoseMachine, PoseState};
pub use runtime::{AvatarRuntime, RuntimeConfig, RuntimeStatus, INBOX_CAPACITY};
pub use timeline::{
    is_viseme_channel, Cue, CueKind, FiredCue, Performance, TimelineConfig, TimelinePlayer,
    TimelineStep, VISEME_CHANNELS,
};
