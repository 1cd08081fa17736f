use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::rig::Rig;
use crate::error::AvatarError;

/// How a clip should be started
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub looping: bool,
    pub crossfade_secs: f64,
}

/// Animation clip cache owned by the rendering stack.
///
/// Loading clip files is outside this crate; the core only asks whether a
/// clip is available, how long it runs, and to start it.
pub trait ClipLibrary: Send {
    fn has_clip_loaded(&self, name: &str) -> bool;

    fn clip_duration(&self, name: &str) -> Option<Duration>;

    /// Start a clip, crossfading from whatever is playing.
    /// Fails with `ClipNotLoaded` when the clip is unknown.
    fn play(&mut self, name: &str, options: PlayOptions) -> Result<(), AvatarError>;

    /// Evaluate the clip pose for this tick. Runs before any procedural layer.
    fn evaluate(&mut self, _dt: f64, _rig: &mut dyn Rig) {}
}

/// Clip metadata as listed in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    pub name: String,
    pub url: String,
    pub duration_secs: f64,
}

impl ClipSpec {
    pub fn new(name: &str, url: &str, duration_secs: f64) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            duration_secs,
        }
    }
}

/// Default local clip set: greeting, base idle and three fidgets
pub fn default_clips() -> Vec<ClipSpec> {
    vec![
        ClipSpec::new("hello", "/animations/v_hello.vrma", 3.0),
        ClipSpec::new("base", "/animations/standing.vrma", 4.0),
        ClipSpec::new("idle", "/animations/waiting-animation.vrma", 5.0),
        ClipSpec::new("idle2", "/animations/idle2.vrma", 6.0),
        ClipSpec::new("fix_hair", "/animations/fix_hair.vrma", 4.5),
    ]
}

/// Clip library backed by a static catalog, used when no renderer is attached
#[derive(Debug, Clone, Default)]
pub struct ClipCatalog {
    clips: HashMap<String, ClipSpec>,
    current: Option<(String, PlayOptions)>,
    plays: u64,
}

impl ClipCatalog {
    pub fn new(specs: Vec<ClipSpec>) -> Self {
        let mut catalog = Self::default();
        for spec in specs {
            catalog.register(spec);
        }
        info!("Clip catalog ready with {} clips", catalog.clips.len());
        catalog
    }

    pub fn register(&mut self, spec: ClipSpec) {
        debug!("Registered clip {} ({})", spec.name, spec.url);
        self.clips.insert(spec.name.clone(), spec);
    }

    /// Name of the clip most recently started
    pub fn current_clip(&self) -> Option<&str> {
        self.current.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn current_options(&self) -> Option<PlayOptions> {
        self.current.as_ref().map(|(_, opts)| *opts)
    }

    /// Number of clips started since construction
    pub fn play_count(&self) -> u64 {
        self.plays
    }
}

impl ClipLibrary for ClipCatalog {
    fn has_clip_loaded(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    fn clip_duration(&self, name: &str) -> Option<Duration> {
        self.clips
            .get(name)
            .map(|c| Duration::from_secs_f64(c.duration_secs.max(0.0)))
    }

    fn play(&mut self, name: &str, options: PlayOptions) -> Result<(), AvatarError> {
        if !self.clips.contains_key(name) {
            return Err(AvatarError::ClipNotLoaded(name.to_string()));
        }

        debug!(
            "Playing clip {} (loop={}, crossfade={:.2}s)",
            name, options.looping, options.crossfade_secs
        );
        self.current = Some((name.to_string(), options));
        self.plays += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_unknown_clip_is_not_loaded() {
        let mut catalog = ClipCatalog::new(default_clips());
        let opts = PlayOptions {
            looping: false,
            crossfade_secs: 0.5,
        };

        let err = catalog.play("moonwalk", opts).unwrap_err();
        assert_eq!(err, AvatarError::ClipNotLoaded("moonwalk".to_string()));
        assert!(catalog.current_clip().is_none());

        catalog.play("base", opts).unwrap();
        assert_eq!(catalog.current_clip(), Some("base"));
    }

    #[test]
    fn test_default_durations() {
        let catalog = ClipCatalog::new(default_clips());
        assert_eq!(catalog.clip_duration("hello"), Some(Duration::from_secs(3)));
        assert!(catalog.has_clip_loaded("fix_hair"));
        assert!(catalog.clip_duration("missing").is_none());
    }

    #[test]
    fn test_replays_only_track_current_clip() {
        let mut catalog = ClipCatalog::new(default_clips());
        let fidgets = ["idle", "base", "idle2", "base", "fix_hair"];

        for name in fidgets.iter().cycle().take(1_000) {
            let looping = *name == "base";
            catalog
                .play(
                    name,
                    PlayOptions {
                        looping,
                        crossfade_secs: 1.5,
                    },
                )
                .unwrap();
        }

        assert_eq!(catalog.play_count(), 1_000);
        assert_eq!(catalog.current_clip(), Some("fix_hair"));
        assert_eq!(catalog.current_options().map(|o| o.looping), Some(false));
    }
}
