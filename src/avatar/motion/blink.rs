use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::avatar::facial::FacialChannels;
use crate::services::Rig;

/// Blink timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub channel: String,
    pub min_interval_secs: f64,
    pub max_interval_secs: f64,
    pub close_secs: f64,
    pub hold_secs: f64,
    pub open_secs: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            channel: "blink".to_string(),
            min_interval_secs: 3.0,
            max_interval_secs: 10.0,
            close_secs: 0.1,
            hold_secs: 0.1,
            open_secs: 0.1,
        }
    }
}

/// Random-interval eye blink, independent of pose state
#[derive(Debug, Clone)]
pub struct Blink {
    config: BlinkConfig,
    timer: f64,
    next_interval: f64,
}

impl Blink {
    pub fn new(config: BlinkConfig, rng: &mut dyn RngCore) -> Self {
        let next_interval = sample_interval(&config, rng);
        Self {
            config,
            timer: 0.0,
            next_interval,
        }
    }

    pub fn next_interval(&self) -> f64 {
        self.next_interval
    }

    /// Advance the timer; returns true when a blink started this tick
    pub fn update(
        &mut self,
        dt: f64,
        rng: &mut dyn RngCore,
        facial: &mut FacialChannels,
        rig: &dyn Rig,
    ) -> bool {
        self.timer += dt;
        if self.timer < self.next_interval {
            return false;
        }

        self.timer = 0.0;
        self.next_interval = sample_interval(&self.config, rng);

        let c = &self.config;
        if let Err(e) = facial.pulse(rig, &c.channel, 1.0, c.close_secs, c.hold_secs, c.open_secs) {
            debug!("Skipping blink: {}", e);
            return false;
        }
        true
    }
}

fn sample_interval(config: &BlinkConfig, rng: &mut dyn RngCore) -> f64 {
    if config.max_interval_secs > config.min_interval_secs {
        rng.gen_range(config.min_interval_secs..config.max_interval_secs)
    } else {
        config.min_interval_secs
    }
}
