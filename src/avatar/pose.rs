use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::motion::WanderTarget;
use crate::events::PoseChange;
use crate::services::ClipLibrary;

/// Behavioral state of the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseState {
    Hello,
    Waiting,
    Attention,
    Thinking,
    Talking,
}

impl PoseState {
    /// Breathing only runs while the avatar is at rest
    pub fn breathes(self) -> bool {
        matches!(self, PoseState::Waiting | PoseState::Attention)
    }

    /// Position in the directed sequence Attention -> Thinking -> Talking
    fn rank(self) -> u8 {
        match self {
            PoseState::Hello | PoseState::Waiting => 0,
            PoseState::Attention => 1,
            PoseState::Thinking => 2,
            PoseState::Talking => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Boredom {
    Counting { remaining: f64 },
    Fidgeting { clip: String, remaining: f64 },
}

// Per-state payload; timers only exist in the states that own them.
#[derive(Debug, Clone, PartialEq)]
enum PoseMode {
    /// `None` until `start` has requested the greeting clip
    Hello { remaining: Option<f64> },
    Waiting { boredom: Boredom },
    Attention,
    Thinking { wander: WanderTarget },
    Talking,
}

impl PoseMode {
    fn state(&self) -> PoseState {
        match self {
            PoseMode::Hello { .. } => PoseState::Hello,
            PoseMode::Waiting { .. } => PoseState::Waiting,
            PoseMode::Attention => PoseState::Attention,
            PoseMode::Thinking { .. } => PoseState::Thinking,
            PoseMode::Talking => PoseState::Talking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub hello_clip: String,
    pub base_clip: String,
    pub fidget_clips: Vec<String>,
    pub boredom_secs: f64,
    pub clip_crossfade_secs: f64,
    pub smile_channel: String,
    pub smile_intensity: f32,
    pub smile_fade_in_secs: f64,
    pub smile_fade_out_secs: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            hello_clip: "hello".to_string(),
            base_clip: "base".to_string(),
            fidget_clips: vec![
                "idle".to_string(),
                "idle2".to_string(),
                "fix_hair".to_string(),
            ],
            boredom_secs: 10.0,
            clip_crossfade_secs: 1.5,
            smile_channel: "happy".to_string(),
            smile_intensity: 1.0,
            smile_fade_in_secs: 0.25,
            smile_fade_out_secs: 0.4,
        }
    }
}

/// Side effects of a transition, applied by the runtime in order
#[derive(Debug, Clone, PartialEq)]
pub enum PoseEffect {
    PlayClip {
        name: String,
        looping: bool,
        crossfade_secs: f64,
    },
    FadeChannel {
        channel: String,
        target: f32,
        secs: f64,
    },
    /// Capture the head/neck rotation gaze offsets apply to
    CaptureBaseline { overwrite: bool },
    Changed(PoseChange),
}

/// The avatar's behavioral state machine.
///
/// Pure: it reads clip availability but never touches the rig or starts
/// clips itself. Every transition returns the effects to apply.
#[derive(Debug, Clone)]
pub struct PoseMachine {
    config: PoseConfig,
    mode: PoseMode,
    current_clip: Option<String>,
    wander_speed: f64,
}

impl PoseMachine {
    pub fn new(config: PoseConfig, wander_speed: f64) -> Self {
        Self {
            config,
            mode: PoseMode::Hello { remaining: None },
            current_clip: None,
            wander_speed,
        }
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    pub fn state(&self) -> PoseState {
        self.mode.state()
    }

    /// Last clip requested by the machine or reported through `note_clip`
    pub fn current_clip(&self) -> Option<&str> {
        self.current_clip.as_deref()
    }

    /// Record a clip started outside the machine (animation directives)
    pub fn note_clip(&mut self, name: &str) {
        self.current_clip = Some(name.to_string());
    }

    /// Seconds until the boredom timer fires, while counting down
    pub fn boredom_remaining(&self) -> Option<f64> {
        match &self.mode {
            PoseMode::Waiting {
                boredom: Boredom::Counting { remaining },
            } => Some(*remaining),
            _ => None,
        }
    }

    /// Fidget clip in progress, if any
    pub fn fidget(&self) -> Option<&str> {
        match &self.mode {
            PoseMode::Waiting {
                boredom: Boredom::Fidgeting { clip, .. },
            } => Some(clip),
            _ => None,
        }
    }

    /// Wander target; only present in Thinking
    pub fn wander_mut(&mut self) -> Option<&mut WanderTarget> {
        match &mut self.mode {
            PoseMode::Thinking { wander } => Some(wander),
            _ => None,
        }
    }

    /// Request the greeting clip. A missing greeting falls through to
    /// Waiting on the next tick.
    pub fn start(&mut self, clips: &dyn ClipLibrary) -> Vec<PoseEffect> {
        let name = self.config.hello_clip.clone();
        let remaining = match clips.clip_duration(&name) {
            Some(duration) if clips.has_clip_loaded(&name) => duration.as_secs_f64(),
            _ => {
                warn!("Greeting clip {} not loaded, skipping greeting", name);
                0.0
            }
        };

        info!("Avatar greeting ({:.2}s)", remaining);
        self.mode = PoseMode::Hello {
            remaining: Some(remaining),
        };

        if remaining > 0.0 {
            vec![self.play(&name, false)]
        } else {
            Vec::new()
        }
    }

    /// Advance the state timers by `dt` seconds
    pub fn tick(
        &mut self,
        dt: f64,
        clips: &dyn ClipLibrary,
        rng: &mut dyn RngCore,
    ) -> Vec<PoseEffect> {
        match &mut self.mode {
            PoseMode::Hello {
                remaining: Some(remaining),
            } => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    return self.enter_waiting();
                }
                Vec::new()
            }
            PoseMode::Waiting { boredom } => match boredom {
                Boredom::Counting { remaining } => {
                    *remaining -= dt;
                    if *remaining > 0.0 {
                        return Vec::new();
                    }
                    self.start_fidget(clips, rng)
                }
                Boredom::Fidgeting { remaining, .. } => {
                    *remaining -= dt;
                    if *remaining > 0.0 {
                        return Vec::new();
                    }
                    debug!("Fidget finished, back to base idle");
                    self.mode = PoseMode::Waiting {
                        boredom: Boredom::Counting {
                            remaining: self.config.boredom_secs,
                        },
                    };
                    let base = self.config.base_clip.clone();
                    vec![self.play(&base, true)]
                }
            },
            _ => Vec::new(),
        }
    }

    /// The user started speaking or typing
    pub fn notify_attention(&mut self) -> Vec<PoseEffect> {
        let from = self.state();
        if !self.advances_to(PoseState::Attention) {
            return Vec::new();
        }

        let mut effects = Vec::new();
        // A greeting or fidget in progress gives way to the base idle
        if self.current_clip.as_deref() != Some(self.config.base_clip.as_str()) {
            let base = self.config.base_clip.clone();
            effects.push(self.play(&base, true));
        }
        effects.push(PoseEffect::CaptureBaseline { overwrite: true });
        effects.push(PoseEffect::FadeChannel {
            channel: self.config.smile_channel.clone(),
            target: self.config.smile_intensity,
            secs: self.config.smile_fade_in_secs,
        });

        self.mode = PoseMode::Attention;
        effects.push(self.changed(from));
        effects
    }

    /// A reply is being generated
    pub fn notify_thinking(&mut self) -> Vec<PoseEffect> {
        let from = self.state();
        if !self.advances_to(PoseState::Thinking) {
            return Vec::new();
        }

        self.mode = PoseMode::Thinking {
            wander: WanderTarget::neutral(self.wander_speed),
        };
        vec![
            PoseEffect::CaptureBaseline { overwrite: false },
            PoseEffect::FadeChannel {
                channel: self.config.smile_channel.clone(),
                target: 0.0,
                secs: self.config.smile_fade_out_secs,
            },
            self.changed(from),
        ]
    }

    /// Timeline playback of a reply started
    pub fn notify_talking(&mut self) -> Vec<PoseEffect> {
        let from = self.state();
        if !self.advances_to(PoseState::Talking) {
            return Vec::new();
        }

        self.mode = PoseMode::Talking;
        vec![self.changed(from)]
    }

    /// The performance ended (or failed); back to Waiting
    pub fn notify_idle(&mut self) -> Vec<PoseEffect> {
        let from = self.state();
        if from == PoseState::Waiting {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if from == PoseState::Attention {
            effects.push(PoseEffect::FadeChannel {
                channel: self.config.smile_channel.clone(),
                target: 0.0,
                secs: self.config.smile_fade_out_secs,
            });
        }
        effects.extend(self.enter_waiting());
        effects
    }

    /// Back to the initial state; `start` must be called again
    pub fn reset(&mut self) {
        self.mode = PoseMode::Hello { remaining: None };
        self.current_clip = None;
    }

    fn advances_to(&self, to: PoseState) -> bool {
        let from = self.state();
        if to.rank() <= from.rank() {
            debug!("Ignoring {:?} while {:?}", to, from);
            return false;
        }
        true
    }

    fn enter_waiting(&mut self) -> Vec<PoseEffect> {
        let from = self.state();
        self.mode = PoseMode::Waiting {
            boredom: Boredom::Counting {
                remaining: self.config.boredom_secs,
            },
        };

        let mut effects = Vec::new();
        if self.current_clip.as_deref() != Some(self.config.base_clip.as_str()) {
            let base = self.config.base_clip.clone();
            effects.push(self.play(&base, true));
        }
        effects.push(self.changed(from));
        effects
    }

    fn start_fidget(&mut self, clips: &dyn ClipLibrary, rng: &mut dyn RngCore) -> Vec<PoseEffect> {
        let loaded: Vec<&String> = self
            .config
            .fidget_clips
            .iter()
            .filter(|c| clips.has_clip_loaded(c))
            .collect();

        let restart = PoseMode::Waiting {
            boredom: Boredom::Counting {
                remaining: self.config.boredom_secs,
            },
        };
        if loaded.is_empty() {
            debug!("No fidget clips loaded, restarting boredom timer");
            self.mode = restart;
            return Vec::new();
        }

        let clip = loaded[rng.gen_range(0..loaded.len())].clone();
        let Some(duration) = clips.clip_duration(&clip) else {
            self.mode = restart;
            return Vec::new();
        };

        info!("Bored, playing fidget {}", clip);
        self.mode = PoseMode::Waiting {
            boredom: Boredom::Fidgeting {
                clip: clip.clone(),
                remaining: duration.as_secs_f64(),
            },
        };
        vec![self.play(&clip, false)]
    }

    fn play(&mut self, name: &str, looping: bool) -> PoseEffect {
        self.current_clip = Some(name.to_string());
        PoseEffect::PlayClip {
            name: name.to_string(),
            looping,
            crossfade_secs: self.config.clip_crossfade_secs,
        }
    }

    fn changed(&self, from: PoseState) -> PoseEffect {
        let to = self.state();
        info!("Pose {:?} -> {:?}", from, to);
        PoseEffect::Changed(PoseChange { from, to })
    }
}
