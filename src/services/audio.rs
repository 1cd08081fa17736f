use base64::Engine;
use hound::WavReader;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::AvatarError;

/// State of an audio playback as seen on one tick
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStatus {
    Playing { elapsed_secs: f64 },
    Ended,
    /// Asynchronous failure after start (e.g. device lost, resume rejected)
    Failed(String),
}

/// A started audio playback
pub trait Playback: Send {
    /// Current position; polled once per tick
    fn poll(&mut self) -> PlaybackStatus;

    fn duration_secs(&self) -> Option<f64>;

    /// Fire-and-forget stop
    fn stop(&mut self);
}

/// What to play
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRequest {
    /// URL, local path or `data:` URL; `None` for a silent timeline
    pub source: Option<String>,

    /// Used when the source itself cannot be probed for its length
    pub duration_hint_secs: f64,
}

/// Audio output owned by the host
pub trait AudioOutput: Send {
    fn play_audio(&mut self, request: &AudioRequest) -> Result<Box<dyn Playback>, AvatarError>;
}

/// Playback that only follows the session clock.
///
/// Stands in for real audio when no output device is attached, and drives
/// silent timelines (previews with visemes but no audio).
pub struct ClockPlayback {
    clock: Arc<dyn Clock>,
    started_secs: f64,
    duration_secs: f64,
    stopped: bool,
}

impl ClockPlayback {
    pub fn start(clock: Arc<dyn Clock>, duration_secs: f64) -> Self {
        let started_secs = clock.now().as_secs_f64();
        Self {
            clock,
            started_secs,
            duration_secs: duration_secs.max(0.0),
            stopped: false,
        }
    }
}

impl Playback for ClockPlayback {
    fn poll(&mut self) -> PlaybackStatus {
        if self.stopped {
            return PlaybackStatus::Ended;
        }
        let elapsed_secs = self.clock.now().as_secs_f64() - self.started_secs;
        if elapsed_secs >= self.duration_secs {
            PlaybackStatus::Ended
        } else {
            PlaybackStatus::Playing { elapsed_secs }
        }
    }

    fn duration_secs(&self) -> Option<f64> {
        Some(self.duration_secs)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Audio output that resolves and measures audio without producing sound.
///
/// - `data:audio/wav;base64,...` is decoded and probed
/// - `http(s)://` URLs use the request's duration hint
/// - anything else is a WAV path relative to `base_path`
pub struct HeadlessAudio {
    clock: Arc<dyn Clock>,
    base_path: PathBuf,
}

impl HeadlessAudio {
    pub fn new(clock: Arc<dyn Clock>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            clock,
            base_path: base_path.into(),
        }
    }

    fn resolve_duration(&self, source: &str, hint: f64) -> Result<f64, AvatarError> {
        if let Some(rest) = source.strip_prefix("data:") {
            let bytes = decode_data_url(rest)?;
            return wav_duration(Cursor::new(bytes));
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            debug!("Remote audio {}, using {:.2}s hint", source, hint);
            return Ok(hint);
        }

        let path = self.base_path.join(source.trim_start_matches('/'));
        probe_wav_file(&path)
    }
}

impl AudioOutput for HeadlessAudio {
    fn play_audio(&mut self, request: &AudioRequest) -> Result<Box<dyn Playback>, AvatarError> {
        let duration = match &request.source {
            Some(source) => self.resolve_duration(source, request.duration_hint_secs)?,
            None => request.duration_hint_secs,
        };

        info!("Starting headless audio playback ({:.2}s)", duration);
        Ok(Box::new(ClockPlayback::start(Arc::clone(&self.clock), duration)))
    }
}

/// Length in seconds of a WAV file on disk
pub fn probe_wav_file(path: &Path) -> Result<f64, AvatarError> {
    let file = std::fs::File::open(path).map_err(|e| {
        warn!("Failed to open audio {}: {}", path.display(), e);
        AvatarError::AudioPlayback(format!("{}: {}", path.display(), e))
    })?;
    wav_duration(std::io::BufReader::new(file))
}

fn wav_duration<R: Read>(reader: R) -> Result<f64, AvatarError> {
    let reader =
        WavReader::new(reader).map_err(|e| AvatarError::AudioPlayback(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AvatarError::AudioPlayback("WAV has zero sample rate".to_string()));
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

fn decode_data_url(rest: &str) -> Result<Vec<u8>, AvatarError> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AvatarError::InvalidAudioSource("data URL without payload".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(AvatarError::InvalidAudioSource(format!(
            "unsupported data URL encoding: {}",
            header
        )));
    }
    let mime = header.trim_end_matches(";base64");
    if !matches!(mime, "audio/wav" | "audio/x-wav" | "audio/wave") {
        return Err(AvatarError::InvalidAudioSource(format!(
            "unsupported audio type: {}",
            mime
        )));
    }

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AvatarError::InvalidAudioSource(e.to_string()))
}
