use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::services::{Bone, Rig, Rotation};

// Magnitude ranges in radians. Vertical head motion is smaller than
// horizontal; eyes move at two thirds of their full range while thinking.
const HEAD_H: (f32, f32) = (0.15, 0.25);
const HEAD_V: (f32, f32) = (0.10, 0.15);
const HEAD_TILT: (f32, f32) = (0.05, 0.10);
const EYE_H: (f32, f32) = (0.3, 0.4);
const EYE_V: (f32, f32) = (0.1, 0.15);
const EYE_SCALE: f32 = 0.66;
const SIDE_BOOST: f32 = 1.2;
const SIDE_JITTER: f32 = 0.025;

/// Head offset plus absolute eye rotation. `x` is pitch, `y` is yaw and
/// `head_tilt` rolls the head around `z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GazePose {
    pub head_x: f32,
    pub head_y: f32,
    pub head_tilt: f32,
    pub eye_x: f32,
    pub eye_y: f32,
}

impl GazePose {
    pub const NEUTRAL: GazePose = GazePose {
        head_x: 0.0,
        head_y: 0.0,
        head_tilt: 0.0,
        eye_x: 0.0,
        eye_y: 0.0,
    };

    /// L1 distance over head pitch and yaw, the reach test while wandering
    pub fn head_distance(&self, other: &GazePose) -> f32 {
        (self.head_x - other.head_x).abs() + (self.head_y - other.head_y).abs()
    }

    /// L1 distance over every component
    pub fn distance(&self, other: &GazePose) -> f32 {
        self.head_distance(other)
            + (self.head_tilt - other.head_tilt).abs()
            + (self.eye_x - other.eye_x).abs()
            + (self.eye_y - other.eye_y).abs()
    }

    pub fn lerp(&self, to: &GazePose, t: f32) -> GazePose {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        GazePose {
            head_x: mix(self.head_x, to.head_x),
            head_y: mix(self.head_y, to.head_y),
            head_tilt: mix(self.head_tilt, to.head_tilt),
            eye_x: mix(self.eye_x, to.eye_x),
            eye_y: mix(self.eye_y, to.eye_y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    Left,
    Right,
}

impl GazeDirection {
    pub const ALL: [GazeDirection; 6] = [
        GazeDirection::UpLeft,
        GazeDirection::UpRight,
        GazeDirection::DownLeft,
        GazeDirection::DownRight,
        GazeDirection::Left,
        GazeDirection::Right,
    ];
}

/// One randomly sampled thinking target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThinkingPose {
    pub direction: GazeDirection,
    pub pose: GazePose,
    pub dwell_secs: f64,
    pub speed: f64,
}

pub fn sample_thinking_pose(rng: &mut dyn RngCore) -> ThinkingPose {
    let direction = GazeDirection::ALL[rng.gen_range(0..GazeDirection::ALL.len())];

    let h = rng.gen_range(HEAD_H.0..HEAD_H.1);
    let v = rng.gen_range(HEAD_V.0..HEAD_V.1);
    let tilt = rng.gen_range(HEAD_TILT.0..HEAD_TILT.1);
    let eye_h = rng.gen_range(EYE_H.0..EYE_H.1) * EYE_SCALE;
    let eye_v = rng.gen_range(EYE_V.0..EYE_V.1) * EYE_SCALE;

    // (vertical sign, horizontal sign); up is negative pitch, left positive yaw
    let pose = match direction {
        GazeDirection::UpLeft => corner(-1.0, 1.0, h, v, tilt, eye_h, eye_v),
        GazeDirection::UpRight => corner(-1.0, -1.0, h, v, tilt, eye_h, eye_v),
        GazeDirection::DownLeft => corner(1.0, 1.0, h, v, tilt, eye_h, eye_v),
        GazeDirection::DownRight => corner(1.0, -1.0, h, v, tilt, eye_h, eye_v),
        GazeDirection::Left | GazeDirection::Right => {
            let side = if direction == GazeDirection::Left { 1.0 } else { -1.0 };
            GazePose {
                head_x: rng.gen_range(-SIDE_JITTER..SIDE_JITTER),
                head_y: side * h * SIDE_BOOST,
                head_tilt: -side * tilt,
                eye_x: 0.0,
                eye_y: side * eye_h * SIDE_BOOST,
            }
        }
    };

    ThinkingPose {
        direction,
        pose,
        dwell_secs: rng.gen_range(0.5..4.0),
        speed: rng.gen_range(0.5..3.0),
    }
}

fn corner(vs: f32, hs: f32, h: f32, v: f32, tilt: f32, eye_h: f32, eye_v: f32) -> GazePose {
    GazePose {
        head_x: vs * v,
        head_y: hs * h,
        head_tilt: -hs * tilt,
        eye_x: vs * eye_v,
        eye_y: hs * eye_h,
    }
}

/// Where the wander is heading; lives in the Thinking pose state
#[derive(Debug, Clone, PartialEq)]
pub struct WanderTarget {
    pub target: GazePose,
    pub speed: f64,
    pub dwell_remaining: f64,
}

impl WanderTarget {
    /// Starts at neutral with no dwell so the first target is sampled as
    /// soon as the head settles
    pub fn neutral(speed: f64) -> Self {
        Self {
            target: GazePose::NEUTRAL,
            speed,
            dwell_remaining: 0.0,
        }
    }

    fn retarget(&mut self, pose: ThinkingPose) {
        self.target = pose.pose;
        self.speed = pose.speed;
        self.dwell_remaining = pose.dwell_secs;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub base_speed: f64,
    pub return_multiplier: f64,
    pub reach_epsilon: f32,
    pub rest_epsilon: f32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            base_speed: 2.5,
            return_multiplier: 1.5,
            reach_epsilon: 0.01,
            rest_epsilon: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    head: Rotation,
    neck: Rotation,
}

/// Thinking-gaze generator.
///
/// Holds the interpolated current pose; the target comes from the pose
/// machine while Thinking. Outside Thinking the pose decays to neutral and,
/// once there, the generator stops writing so clips own the head again.
#[derive(Debug, Clone)]
pub struct GazeWander {
    config: GazeConfig,
    current: GazePose,
    baseline: Option<Baseline>,
    engaged: bool,
}

impl GazeWander {
    pub fn new(config: GazeConfig) -> Self {
        Self {
            config,
            current: GazePose::NEUTRAL,
            baseline: None,
            engaged: false,
        }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    pub fn current(&self) -> GazePose {
        self.current
    }

    /// True while the generator still drives head and eyes
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Captured (head, neck) rest rotations
    pub fn baseline(&self) -> Option<(Rotation, Rotation)> {
        self.baseline.map(|b| (b.head, b.neck))
    }

    /// Remember the head/neck rotation the offsets are applied to
    pub fn capture_baseline(&mut self, rig: &dyn Rig, overwrite: bool) {
        if self.baseline.is_some() && !overwrite {
            return;
        }
        self.baseline = Some(Baseline {
            head: rig.bone_rotation(Bone::Head).unwrap_or_default(),
            neck: rig.bone_rotation(Bone::Neck).unwrap_or_default(),
        });
    }

    pub fn update(
        &mut self,
        dt: f64,
        wander: Option<&mut WanderTarget>,
        rng: &mut dyn RngCore,
        rig: &mut dyn Rig,
    ) {
        match wander {
            Some(wander) => {
                self.engaged = true;
                let factor = (wander.speed * dt).min(1.0) as f32;
                self.current = self.current.lerp(&wander.target, factor);

                if self.current.head_distance(&wander.target) < self.config.reach_epsilon {
                    wander.dwell_remaining -= dt;
                    if wander.dwell_remaining <= 0.0 {
                        wander.retarget(sample_thinking_pose(rng));
                    }
                }
                self.write(rig);
            }
            None => {
                if !self.engaged {
                    return;
                }
                let speed = self.config.base_speed * self.config.return_multiplier;
                let factor = (speed * dt).min(1.0) as f32;
                self.current = self.current.lerp(&GazePose::NEUTRAL, factor);

                if self.current.distance(&GazePose::NEUTRAL) < self.config.rest_epsilon {
                    self.current = GazePose::NEUTRAL;
                    self.write(rig);
                    self.engaged = false;
                } else {
                    self.write(rig);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.current = GazePose::NEUTRAL;
        self.baseline = None;
        self.engaged = false;
    }

    fn write(&mut self, rig: &mut dyn Rig) {
        if self.baseline.is_none() {
            self.capture_baseline(rig, false);
        }
        let head = self.baseline.map(|b| b.head).unwrap_or_default();
        let c = self.current;

        rig.set_bone_rotation(
            Bone::Head,
            head.offset(Rotation::new(c.head_x, c.head_y, c.head_tilt)),
        );
        let eyes = Rotation::new(c.eye_x, c.eye_y, 0.0);
        rig.set_bone_rotation(Bone::LeftEye, eyes);
        rig.set_bone_rotation(Bone::RightEye, eyes);
    }
}
