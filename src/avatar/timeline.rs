use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::facial::FacialChannels;
use crate::aggregator::CompleteBundle;
use crate::clock::Clock;
use crate::error::AvatarError;
use crate::protocol::{AnimationSequence, FastPreview};
use crate::services::{
    AudioOutput, AudioRequest, ClipLibrary, ClockPlayback, PlayOptions, Playback, PlaybackStatus,
    Rig,
};

/// Mouth-shape channels driven by visemes. Expression cues naming one of
/// these are ignored so lip-sync keeps the mouth.
pub const VISEME_CHANNELS: &[&str] = &["aa", "ih", "ou", "ee", "oh", "neutral"];

pub fn is_viseme_channel(name: &str) -> bool {
    VISEME_CHANNELS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub fade_in_secs: f64,
    pub hold_secs: f64,
    pub fade_out_secs: f64,
    pub viseme_intensity: f32,
    pub default_expression_intensity: f32,
    /// Crossfade for directive clips without a keyframe crossfade
    pub directive_crossfade_secs: f64,
    /// Fade applied to touched channels when playback stops
    pub stop_release_secs: f64,
    /// Added after the last cue to size silent timelines
    pub tail_secs: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            fade_in_secs: 0.15,
            hold_secs: 0.2,
            fade_out_secs: 0.15,
            viseme_intensity: 0.75,
            default_expression_intensity: 1.0,
            directive_crossfade_secs: 0.8,
            stop_release_secs: 0.15,
            tail_secs: 0.5,
        }
    }
}

/// One timed facial event
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub time: f64,
    pub channel: String,
    /// `None` uses the configured default for the cue kind
    pub intensity: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    Viseme,
    Expression,
}

/// Record of a cue that was applied
#[derive(Debug, Clone, PartialEq)]
pub struct FiredCue {
    pub kind: CueKind,
    pub time: f64,
    pub channel: String,
    pub fired_at: f64,
}

/// Everything the timeline needs to render one reply or preview
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Performance {
    pub correlation_id: Option<String>,
    pub audio: Option<String>,
    pub visemes: Vec<Cue>,
    pub expressions: Vec<Cue>,
    pub animation: Option<AnimationSequence>,
}

impl Performance {
    pub fn from_bundle(bundle: &CompleteBundle) -> Self {
        let visemes = bundle
            .audio
            .visemas
            .iter()
            .map(|v| Cue {
                time: v.time,
                channel: v.channel.clone(),
                intensity: None,
            })
            .collect();

        let expressions = bundle
            .expressions
            .iter()
            .flat_map(|set| set.expresiones.iter())
            .map(|e| Cue {
                time: e.time,
                channel: e.channel.clone(),
                intensity: e.intensity,
            })
            .collect();

        Self {
            correlation_id: Some(bundle.correlation_id.clone()),
            audio: Some(bundle.audio.audio_url.clone()),
            visemes,
            expressions,
            animation: bundle.animation.as_ref().map(|a| a.sequence.clone()),
        }
    }

    pub fn from_preview(preview: &FastPreview) -> Self {
        let visemes = preview
            .visemas
            .iter()
            .flatten()
            .map(|v| Cue {
                time: v.time,
                channel: v.channel.clone(),
                intensity: None,
            })
            .collect();

        Self {
            correlation_id: None,
            audio: preview.audio_url.clone(),
            visemes,
            expressions: Vec::new(),
            animation: None,
        }
    }

    /// Text-only previews have nothing to render
    pub fn is_playable(&self) -> bool {
        self.audio.is_some() || !self.visemes.is_empty() || !self.expressions.is_empty()
    }

    /// Length estimate from the cues, for sources that cannot be measured
    pub fn duration_hint(&self, tail_secs: f64) -> f64 {
        self.visemes
            .iter()
            .chain(self.expressions.iter())
            .map(|c| c.time)
            .fold(0.0, f64::max)
            + tail_secs
    }
}

/// Result of one timeline tick
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineStep {
    Idle,
    Playing {
        elapsed_secs: f64,
        duration_secs: Option<f64>,
        /// Directive clip started on this tick
        started_clip: Option<String>,
    },
    Ended {
        correlation_id: Option<String>,
    },
    Failed {
        correlation_id: Option<String>,
        message: String,
    },
}

struct PendingClip {
    name: String,
    options: PlayOptions,
    delay_secs: f64,
}

struct ActivePerformance {
    correlation_id: Option<String>,
    playback: Box<dyn Playback>,
    visemes: VecDeque<Cue>,
    expressions: VecDeque<Cue>,
    clip: Option<PendingClip>,
    touched: HashSet<String>,
}

/// Fires viseme and expression cues against elapsed audio time
pub struct TimelinePlayer {
    config: TimelineConfig,
    clock: Arc<dyn Clock>,
    active: Option<ActivePerformance>,
    fired: Vec<FiredCue>,
}

impl TimelinePlayer {
    pub fn new(config: TimelineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            active: None,
            fired: Vec::new(),
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.active.as_ref().and_then(|a| a.correlation_id.as_deref())
    }

    /// Cues fired since the last `play`, in firing order
    pub fn fired(&self) -> &[FiredCue] {
        &self.fired
    }

    /// Start audio and arm the cue queues. Any performance already playing is
    /// stopped first.
    pub fn play(
        &mut self,
        performance: Performance,
        audio: &mut dyn AudioOutput,
        facial: &mut FacialChannels,
        rig: &dyn Rig,
    ) -> Result<(), AvatarError> {
        if self.active.is_some() {
            self.stop(facial, rig);
        }

        let hint = performance.duration_hint(self.config.tail_secs);
        let playback: Box<dyn Playback> = match &performance.audio {
            Some(source) => audio.play_audio(&AudioRequest {
                source: Some(source.clone()),
                duration_hint_secs: hint,
            })?,
            None => Box::new(ClockPlayback::start(Arc::clone(&self.clock), hint)),
        };

        let mut visemes = performance.visemes;
        // Stable, so cues sharing a time keep their arrival order
        visemes.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut expressions: Vec<Cue> = performance
            .expressions
            .into_iter()
            .filter(|c| {
                if is_viseme_channel(&c.channel) {
                    debug!("Ignoring expression on viseme channel {}", c.channel);
                    return false;
                }
                true
            })
            .collect();
        expressions.sort_by(|a, b| a.time.total_cmp(&b.time));

        let clip = performance.animation.as_ref().and_then(|seq| {
            let name = seq.clip_name()?;
            Some(PendingClip {
                name,
                options: PlayOptions {
                    looping: seq.temporary != Some(true),
                    crossfade_secs: seq
                        .crossfade()
                        .unwrap_or(self.config.directive_crossfade_secs),
                },
                delay_secs: seq.delay.max(0.0),
            })
        });

        info!(
            "Timeline started for {} ({} visemes, {} expressions, duration {:?})",
            performance.correlation_id.as_deref().unwrap_or("preview"),
            visemes.len(),
            expressions.len(),
            playback.duration_secs()
        );

        self.fired.clear();
        self.active = Some(ActivePerformance {
            correlation_id: performance.correlation_id,
            playback,
            visemes: visemes.into(),
            expressions: expressions.into(),
            clip,
            touched: HashSet::new(),
        });
        Ok(())
    }

    pub fn tick(
        &mut self,
        facial: &mut FacialChannels,
        rig: &dyn Rig,
        clips: &mut dyn ClipLibrary,
    ) -> TimelineStep {
        let Some(active) = self.active.as_mut() else {
            return TimelineStep::Idle;
        };

        let elapsed = match active.playback.poll() {
            PlaybackStatus::Playing { elapsed_secs } => elapsed_secs,
            PlaybackStatus::Ended => {
                let correlation_id = active.correlation_id.clone();
                info!(
                    "Timeline ended for {}",
                    correlation_id.as_deref().unwrap_or("preview")
                );
                self.finish(facial, rig);
                return TimelineStep::Ended { correlation_id };
            }
            PlaybackStatus::Failed(message) => {
                let correlation_id = active.correlation_id.clone();
                self.finish(facial, rig);
                return TimelineStep::Failed {
                    correlation_id,
                    message,
                };
            }
        };

        let c = &self.config;
        while active.visemes.front().is_some_and(|cue| cue.time <= elapsed) {
            let Some(cue) = active.visemes.pop_front() else {
                break;
            };
            let peak = cue.intensity.unwrap_or(c.viseme_intensity);
            match facial.pulse(rig, &cue.channel, peak, c.fade_in_secs, c.hold_secs, c.fade_out_secs)
            {
                Ok(()) => {
                    active.touched.insert(cue.channel.clone());
                    self.fired.push(FiredCue {
                        kind: CueKind::Viseme,
                        time: cue.time,
                        channel: cue.channel,
                        fired_at: elapsed,
                    });
                }
                Err(e) => warn!("Dropping viseme at {:.3}s: {}", cue.time, e),
            }
        }

        while active
            .expressions
            .front()
            .is_some_and(|cue| cue.time <= elapsed)
        {
            let Some(cue) = active.expressions.pop_front() else {
                break;
            };
            let peak = cue.intensity.unwrap_or(c.default_expression_intensity);
            match facial.pulse(rig, &cue.channel, peak, c.fade_in_secs, c.hold_secs, c.fade_out_secs)
            {
                Ok(()) => {
                    active.touched.insert(cue.channel.clone());
                    self.fired.push(FiredCue {
                        kind: CueKind::Expression,
                        time: cue.time,
                        channel: cue.channel,
                        fired_at: elapsed,
                    });
                }
                Err(e) => warn!("Dropping expression at {:.3}s: {}", cue.time, e),
            }
        }

        let mut started_clip = None;
        if active.clip.as_ref().is_some_and(|p| elapsed >= p.delay_secs) {
            if let Some(pending) = active.clip.take() {
                match clips.play(&pending.name, pending.options) {
                    Ok(()) => {
                        info!("Directive clip {} started", pending.name);
                        started_clip = Some(pending.name);
                    }
                    Err(e) => warn!("Skipping directive clip: {}", e),
                }
            }
        }

        TimelineStep::Playing {
            elapsed_secs: elapsed,
            duration_secs: active.playback.duration_secs(),
            started_clip,
        }
    }

    /// Stop audio and fade every channel this performance touched. Pending
    /// cues are dropped. Returns the stopped correlation id.
    pub fn stop(&mut self, facial: &mut FacialChannels, rig: &dyn Rig) -> Option<String> {
        let active = self.active.as_mut()?;
        active.playback.stop();
        let correlation_id = active.correlation_id.clone();
        info!(
            "Timeline stopped for {}",
            correlation_id.as_deref().unwrap_or("preview")
        );
        self.finish(facial, rig);
        correlation_id
    }

    fn finish(&mut self, facial: &mut FacialChannels, rig: &dyn Rig) {
        if let Some(active) = self.active.take() {
            for channel in &active.touched {
                facial.release(rig, channel, self.config.stop_release_secs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::services::{default_clips, ClipCatalog, HeadlessAudio, HeadlessRig};

    fn cue(time: f64, channel: &str) -> Cue {
        Cue {
            time,
            channel: channel.to_string(),
            intensity: None,
        }
    }

    fn setup() -> (ManualClock, TimelinePlayer, HeadlessAudio) {
        let clock = ManualClock::new();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        (
            clock,
            TimelinePlayer::new(TimelineConfig::default(), Arc::clone(&shared)),
            HeadlessAudio::new(shared, "/nonexistent"),
        )
    }

    #[test]
    fn test_unsorted_cues_fire_in_time_order() {
        let (clock, mut player, mut audio) = setup();
        let mut rig = HeadlessRig::with_default_channels();
        let mut facial = FacialChannels::new();
        let mut clips = ClipCatalog::new(default_clips());

        let performance = Performance {
            visemes: vec![cue(0.3, "ou"), cue(0.1, "aa"), cue(0.2, "ih"), cue(0.1, "ee")],
            ..Default::default()
        };
        player.play(performance, &mut audio, &mut facial, &rig).unwrap();

        for _ in 0..30 {
            clock.advance_ms(16);
            player.tick(&mut facial, &rig, &mut clips);
            facial.apply(0.016, &mut rig);
        }

        let fired: Vec<&str> = player.fired().iter().map(|f| f.channel.as_str()).collect();
        assert_eq!(fired, vec!["aa", "ee", "ih", "ou"]);
        let times: Vec<f64> = player.fired().iter().map(|f| f.time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(player.fired().iter().all(|f| f.fired_at >= f.time));
    }

    #[test]
    fn test_missing_channel_is_dropped() {
        let (clock, mut player, mut audio) = setup();
        let rig = HeadlessRig::humanoid(&["aa"]);
        let mut facial = FacialChannels::new();
        let mut clips = ClipCatalog::new(vec![]);

        let performance = Performance {
            visemes: vec![cue(0.0, "zz"), cue(0.0, "aa")],
            ..Default::default()
        };
        player.play(performance, &mut audio, &mut facial, &rig).unwrap();
        clock.advance_ms(10);
        player.tick(&mut facial, &rig, &mut clips);

        assert_eq!(player.fired().len(), 1);
        assert_eq!(player.fired()[0].channel, "aa");
    }

    #[test]
    fn test_expressions_skip_viseme_channels() {
        let (clock, mut player, mut audio) = setup();
        let rig = HeadlessRig::with_default_channels();
        let mut facial = FacialChannels::new();
        let mut clips = ClipCatalog::new(vec![]);

        let performance = Performance {
            expressions: vec![cue(0.0, "aa"), cue(0.0, "happy")],
            ..Default::default()
        };
        player.play(performance, &mut audio, &mut facial, &rig).unwrap();
        clock.advance_ms(10);
        player.tick(&mut facial, &rig, &mut clips);

        assert_eq!(player.fired().len(), 1);
        assert_eq!(player.fired()[0].kind, CueKind::Expression);
        assert_eq!(player.fired()[0].channel, "happy");
    }

    #[test]
    fn test_silent_timeline_ends_after_tail() {
        let (clock, mut player, mut audio) = setup();
        let rig = HeadlessRig::with_default_channels();
        let mut facial = FacialChannels::new();
        let mut clips = ClipCatalog::new(vec![]);

        let performance = Performance {
            visemes: vec![cue(1.0, "aa")],
            ..Default::default()
        };
        player.play(performance, &mut audio, &mut facial, &rig).unwrap();

        clock.advance_ms(1400);
        assert!(matches!(
            player.tick(&mut facial, &rig, &mut clips),
            TimelineStep::Playing { .. }
        ));
        clock.advance_ms(200);
        assert_eq!(
            player.tick(&mut facial, &rig, &mut clips),
            TimelineStep::Ended {
                correlation_id: None
            }
        );
        assert!(!player.is_playing());
    }

    #[test]
    fn test_stop_releases_touched_channels() {
        let (clock, mut player, mut audio) = setup();
        let mut rig = HeadlessRig::with_default_channels();
        let mut facial = FacialChannels::new();
        let mut clips = ClipCatalog::new(vec![]);

        let performance = Performance {
            correlation_id: Some("7".to_string()),
            visemes: vec![cue(0.0, "aa"), cue(5.0, "oh")],
            ..Default::default()
        };
        player.play(performance, &mut audio, &mut facial, &rig).unwrap();
        clock.advance_ms(100);
        player.tick(&mut facial, &rig, &mut clips);
        facial.apply(0.1, &mut rig);
        assert!(rig.channel_value("aa").unwrap() > 0.0);

        assert_eq!(player.stop(&mut facial, &rig), Some("7".to_string()));
        facial.apply(0.15, &mut rig);
        assert_eq!(rig.channel_value("aa"), Some(0.0));
        assert!(player.fired().iter().all(|f| f.channel != "oh"));
    }

    #[test]
    fn test_directive_clip_starts_after_delay() {
        let (clock, mut player, mut audio) = setup();
        let rig = HeadlessRig::with_default_channels();
        let mut facial = FacialChannels::new();
        let mut clips = ClipCatalog::new(default_clips());

        let performance = Performance {
            visemes: vec![cue(2.0, "aa")],
            animation: Some(AnimationSequence {
                sequence: "wave".to_string(),
                description: None,
                keyframes: None,
                vrma_file: Some("/animations/idle2.vrma".to_string()),
                breathing: false,
                delay: 0.5,
                temporary: None,
            }),
            ..Default::default()
        };
        player.play(performance, &mut audio, &mut facial, &rig).unwrap();

        clock.advance_ms(300);
        player.tick(&mut facial, &rig, &mut clips);
        assert!(clips.current_clip().is_none());

        clock.advance_ms(300);
        match player.tick(&mut facial, &rig, &mut clips) {
            TimelineStep::Playing { started_clip, .. } => {
                assert_eq!(started_clip.as_deref(), Some("idle2"))
            }
            other => panic!("unexpected {:?}", other),
        }
        let options = clips.current_options().unwrap();
        assert!(options.looping);
        assert_eq!(options.crossfade_secs, 0.8);
    }

    #[test]
    fn test_temporary_directive_plays_once() {
        let (_clock, mut player, mut audio) = setup();
        let rig = HeadlessRig::with_default_channels();
        let mut facial = FacialChannels::new();
        let mut clips = ClipCatalog::new(default_clips());

        let performance = Performance {
            visemes: vec![cue(1.0, "aa")],
            animation: Some(AnimationSequence {
                sequence: "hair".to_string(),
                description: None,
                keyframes: None,
                vrma_file: Some("/animations/fix_hair.vrma".to_string()),
                breathing: true,
                delay: 0.0,
                temporary: Some(true),
            }),
            ..Default::default()
        };
        player.play(performance, &mut audio, &mut facial, &rig).unwrap();
        player.tick(&mut facial, &rig, &mut clips);

        assert_eq!(clips.current_clip(), Some("fix_hair"));
        assert!(!clips.current_options().unwrap().looping);
    }
}
