use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::facial::FacialChannels;
use super::motion::{Blink, BlinkConfig, Breathing, BreathingConfig, BreathingUpdate, GazeConfig, GazeWander};
use super::pose::{PoseConfig, PoseEffect, PoseMachine, PoseState};
use super::timeline::{Performance, TimelineConfig, TimelinePlayer, TimelineStep};
use crate::aggregator::{AggregatorConfig, AggregatorStats, BundleStatus, CompleteBundle, ResponseAggregator};
use crate::clock::Clock;
use crate::error::AvatarError;
use crate::events::{AvatarEvents, PlaybackEvent};
use crate::protocol::{classify, FastPreview, Inbound, ServerError};
use crate::services::{
    default_clips, AudioOutput, ClipCatalog, ClipLibrary, ClipSpec, HeadlessAudio, HeadlessRig,
    PlayOptions, Rig, DEFAULT_CHANNELS,
};

/// Capacity of the raw message inbox
pub const INBOX_CAPACITY: usize = 256;

/// Configuration for one avatar session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Animation ticks per second
    pub tick_hz: u32,

    /// Play completed bundles and previews as soon as they are available
    pub autoplay: bool,

    pub aggregator: AggregatorConfig,
    pub pose: PoseConfig,
    pub breathing: BreathingConfig,
    pub blink: BlinkConfig,
    pub gaze: GazeConfig,
    pub timeline: TimelineConfig,

    /// Clip catalog of the headless clip library
    pub clips: Vec<ClipSpec>,

    /// Facial channels of the headless rig
    pub channels: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            autoplay: true,
            aggregator: AggregatorConfig::default(),
            pose: PoseConfig::default(),
            breathing: BreathingConfig::default(),
            blink: BlinkConfig::default(),
            gaze: GazeConfig::default(),
            timeline: TimelineConfig::default(),
            clips: default_clips(),
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}

/// Snapshot of a session for the control surface
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    pub pose: PoseState,
    pub current_clip: Option<String>,
    pub playing: bool,
    pub playing_correlation_id: Option<String>,
    pub pending: Vec<BundleStatus>,
    pub stats: AggregatorStats,
    pub breathing: BreathingConfig,
    pub uptime_secs: f64,
}

/// One avatar session: aggregation, pose, procedural motion and timeline
/// driven from a single animation tick.
///
/// Inbound payloads may be pushed from any task through `inbox()`; they are
/// only classified and aggregated inside `tick`, which keeps every piece of
/// state single-writer.
pub struct AvatarRuntime<R = HeadlessRig, C = ClipCatalog, A = HeadlessAudio>
where
    R: Rig,
    C: ClipLibrary,
    A: AudioOutput,
{
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
    inbox_tx: mpsc::Sender<Vec<u8>>,
    inbox_rx: mpsc::Receiver<Vec<u8>>,
    aggregator: ResponseAggregator,
    pose: PoseMachine,
    breathing: Breathing,
    gaze: GazeWander,
    blink: Blink,
    facial: FacialChannels,
    timeline: TimelinePlayer,
    rig: R,
    clips: C,
    audio: A,
    events: AvatarEvents,
    started_at: Option<Duration>,
    last_tick: Option<Duration>,
    since_sweep: Duration,
}

impl AvatarRuntime<HeadlessRig, ClipCatalog, HeadlessAudio> {
    /// Session with the headless rig, clip catalog and WAV-probing audio
    pub fn headless(
        config: RuntimeConfig,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
        audio_base: impl Into<PathBuf>,
    ) -> Self {
        let rig = HeadlessRig::humanoid(&config.channels);
        let clips = ClipCatalog::new(config.clips.clone());
        let audio = HeadlessAudio::new(Arc::clone(&clock), audio_base);
        Self::new(config, clock, rng, rig, clips, audio)
    }
}

impl<R, C, A> AvatarRuntime<R, C, A>
where
    R: Rig,
    C: ClipLibrary,
    A: AudioOutput,
{
    pub fn new(
        config: RuntimeConfig,
        clock: Arc<dyn Clock>,
        mut rng: Box<dyn RngCore + Send>,
        rig: R,
        clips: C,
        audio: A,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let blink = Blink::new(config.blink.clone(), rng.as_mut());

        Self {
            aggregator: ResponseAggregator::new(config.aggregator.clone()),
            pose: PoseMachine::new(config.pose.clone(), config.gaze.base_speed),
            breathing: Breathing::new(config.breathing.clone()),
            gaze: GazeWander::new(config.gaze.clone()),
            blink,
            facial: FacialChannels::new(),
            timeline: TimelinePlayer::new(config.timeline.clone(), Arc::clone(&clock)),
            config,
            clock,
            rng,
            inbox_tx,
            inbox_rx,
            rig,
            clips,
            audio,
            events: AvatarEvents::default(),
            started_at: None,
            last_tick: None,
            since_sweep: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Begin the session with the greeting
    pub fn start(&mut self) {
        let now = self.clock.now();
        self.started_at = Some(now);
        self.last_tick = Some(now);
        info!("Avatar session started");

        let effects = self.pose.start(&self.clips);
        self.apply_effects(effects);
    }

    /// Sender for raw transport payloads
    pub fn inbox(&self) -> mpsc::Sender<Vec<u8>> {
        self.inbox_tx.clone()
    }

    pub fn events(&self) -> &AvatarEvents {
        &self.events
    }

    pub fn pose_state(&self) -> PoseState {
        self.pose.state()
    }

    pub fn aggregator(&self) -> &ResponseAggregator {
        &self.aggregator
    }

    pub fn timeline(&self) -> &TimelinePlayer {
        &self.timeline
    }

    pub fn gaze(&self) -> &GazeWander {
        &self.gaze
    }

    pub fn rig(&self) -> &R {
        &self.rig
    }

    pub fn rig_mut(&mut self) -> &mut R {
        &mut self.rig
    }

    pub fn clips(&self) -> &C {
        &self.clips
    }

    /// Classify and handle one payload immediately
    pub fn ingest_raw(&mut self, raw: &[u8]) {
        match classify(raw) {
            Inbound::Heartbeat => debug!("Heartbeat from reply service"),
            Inbound::ServerError(err) => self.on_server_error(err),
            Inbound::FastPreview(preview) => self.on_fast_preview(preview),
            Inbound::Part(part) => {
                let now = self.clock.now();
                match self.aggregator.ingest(part, now) {
                    Ok(Some(bundle)) => self.on_bundle_complete(bundle),
                    Ok(None) => {}
                    Err(e) => report(&e),
                }
            }
            Inbound::Malformed(reason) => report(&AvatarError::MalformedMessage(reason)),
            Inbound::Unclassified(value) => {
                report(&AvatarError::Unclassified(value.to_string()))
            }
        }
    }

    /// One animation tick.
    ///
    /// Order: inbox, aggregation timers, pose timers, clip pose, breathing,
    /// gaze, blink, timeline cues, facial channels.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let dt = self
            .last_tick
            .map(|last| now.saturating_sub(last))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);
        let dt_secs = dt.as_secs_f64();

        while let Ok(raw) = self.inbox_rx.try_recv() {
            self.ingest_raw(&raw);
        }

        for bundle in self.aggregator.poll_ready(now) {
            self.on_bundle_complete(bundle);
        }

        self.since_sweep += dt;
        if self.since_sweep >= self.config.aggregator.sweep_interval() {
            self.since_sweep = Duration::ZERO;
            let max_age = self.config.aggregator.max_age();
            let evicted = self.aggregator.sweep(now, max_age);
            if !evicted.is_empty() {
                debug!("Swept {} stale bundles", evicted.len());
            }
        }

        let effects = self.pose.tick(dt_secs, &self.clips, self.rng.as_mut());
        self.apply_effects(effects);

        self.clips.evaluate(dt_secs, &mut self.rig);

        let state = self.pose.state();
        self.breathing.update(now.as_secs_f64(), state, &mut self.rig);
        self.gaze.update(
            dt_secs,
            self.pose.wander_mut(),
            self.rng.as_mut(),
            &mut self.rig,
        );
        self.blink
            .update(dt_secs, self.rng.as_mut(), &mut self.facial, &self.rig);

        let step = self.timeline.tick(&mut self.facial, &self.rig, &mut self.clips);
        self.on_timeline_step(step);

        self.facial.apply(dt_secs, &mut self.rig);
    }

    pub fn notify_attention(&mut self) {
        let effects = self.pose.notify_attention();
        self.apply_effects(effects);
    }

    pub fn notify_thinking(&mut self) {
        let effects = self.pose.notify_thinking();
        self.apply_effects(effects);
    }

    /// Play a completed bundle and move to Talking
    pub fn notify_talking(&mut self, bundle: &CompleteBundle) -> Result<(), AvatarError> {
        self.play(Performance::from_bundle(bundle))
    }

    /// End the current performance, if any, and return to Waiting
    pub fn notify_idle(&mut self) {
        if self.timeline.is_playing() {
            let correlation_id = self.timeline.stop(&mut self.facial, &self.rig);
            self.events
                .playback
                .emit(&PlaybackEvent::Ended { correlation_id });
        }
        let effects = self.pose.notify_idle();
        self.apply_effects(effects);
    }

    pub fn set_breathing_config(&mut self, update: &BreathingUpdate) {
        self.breathing.apply_update(update);
        info!("Breathing config updated: {:?}", self.breathing.config());
    }

    pub fn status(&self) -> RuntimeStatus {
        let now = self.clock.now();
        RuntimeStatus {
            pose: self.pose.state(),
            current_clip: self.pose.current_clip().map(str::to_string),
            playing: self.timeline.is_playing(),
            playing_correlation_id: self.timeline.correlation_id().map(str::to_string),
            pending: self
                .aggregator
                .pending_ids()
                .iter()
                .filter_map(|id| self.aggregator.pending_status(id, now))
                .collect(),
            stats: self.aggregator.stats().clone(),
            breathing: self.breathing.config().clone(),
            uptime_secs: self
                .started_at
                .map(|s| now.saturating_sub(s).as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    /// Stop playback and return every component to its initial state.
    /// Subscriptions survive; `start` begins a new session.
    pub fn teardown(&mut self) {
        self.timeline.stop(&mut self.facial, &self.rig);
        self.facial.clear();
        self.aggregator.reset();
        self.pose.reset();
        self.gaze.reset();
        while self.inbox_rx.try_recv().is_ok() {}
        self.started_at = None;
        self.last_tick = None;
        self.since_sweep = Duration::ZERO;
        info!("Avatar session torn down");
    }

    fn on_server_error(&mut self, err: ServerError) {
        report(&AvatarError::ServerReported {
            kind: err.kind.clone(),
            message: err.error.clone(),
        });
        self.events.server_error.emit(&err);
    }

    fn on_fast_preview(&mut self, preview: FastPreview) {
        self.aggregator.record_fast_preview();
        info!(
            "Fast preview (audio={}, visemes={}, text={})",
            preview.audio_url.is_some(),
            preview.visemas.as_ref().map(|v| v.len()).unwrap_or(0),
            preview.text.is_some()
        );
        self.events.fast_preview.emit(&preview);

        if !self.config.autoplay {
            return;
        }
        let performance = Performance::from_preview(&preview);
        if performance.is_playable() {
            if let Err(e) = self.play(performance) {
                debug!("Preview not played: {}", e);
            }
        }
    }

    fn on_bundle_complete(&mut self, bundle: CompleteBundle) {
        self.events.bundle_complete.emit(&bundle);
        if self.config.autoplay {
            if let Err(e) = self.notify_talking(&bundle) {
                debug!("Bundle {} not played: {}", bundle.correlation_id, e);
            }
        }
    }

    fn play(&mut self, performance: Performance) -> Result<(), AvatarError> {
        let correlation_id = performance.correlation_id.clone();
        match self
            .timeline
            .play(performance, &mut self.audio, &mut self.facial, &self.rig)
        {
            Ok(()) => {
                self.events
                    .playback
                    .emit(&PlaybackEvent::Started { correlation_id });
                let effects = self.pose.notify_talking();
                self.apply_effects(effects);
                Ok(())
            }
            Err(e) => {
                self.on_playback_failed(correlation_id, e.to_string());
                Err(e)
            }
        }
    }

    fn on_timeline_step(&mut self, step: TimelineStep) {
        match step {
            TimelineStep::Idle => {}
            TimelineStep::Playing {
                elapsed_secs,
                duration_secs,
                started_clip,
            } => {
                if let Some(clip) = started_clip {
                    self.pose.note_clip(&clip);
                }
                self.events.playback.emit(&PlaybackEvent::Progress {
                    elapsed_secs,
                    duration_secs,
                });
            }
            TimelineStep::Ended { correlation_id } => {
                self.events
                    .playback
                    .emit(&PlaybackEvent::Ended { correlation_id });
                let effects = self.pose.notify_idle();
                self.apply_effects(effects);
            }
            TimelineStep::Failed {
                correlation_id,
                message,
            } => self.on_playback_failed(correlation_id, message),
        }
    }

    fn on_playback_failed(&mut self, correlation_id: Option<String>, message: String) {
        report(&AvatarError::AudioPlayback(format!(
            "{} ({})",
            message,
            correlation_id.as_deref().unwrap_or("preview")
        )));
        self.events.playback.emit(&PlaybackEvent::Failed {
            correlation_id,
            message,
        });
        let effects = self.pose.notify_idle();
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<PoseEffect>) {
        for effect in effects {
            match effect {
                PoseEffect::PlayClip {
                    name,
                    looping,
                    crossfade_secs,
                } => {
                    let options = PlayOptions {
                        looping,
                        crossfade_secs,
                    };
                    if let Err(e) = self.clips.play(&name, options) {
                        warn!("{}", e);
                    }
                }
                PoseEffect::FadeChannel {
                    channel,
                    target,
                    secs,
                } => {
                    if let Err(e) = self.facial.ramp(&self.rig, &channel, target, secs) {
                        warn!("{}", e);
                    }
                }
                PoseEffect::CaptureBaseline { overwrite } => {
                    self.gaze.capture_baseline(&self.rig, overwrite);
                }
                PoseEffect::Changed(change) => self.events.pose.emit(&change),
            }
        }
    }
}

/// Surfaced errors are logged at error level, recovered ones as warnings
fn report(err: &AvatarError) {
    if err.is_surfaced() {
        error!("{}", err);
    } else {
        warn!("{}", err);
    }
}
