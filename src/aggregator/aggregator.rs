// Response aggregator
//
// Buffers correlated reply parts per message id until the bundle is playable,
// then hands it out exactly once. Bundles that never receive their audio are
// dropped by a periodic sweep so the buffer cannot grow without bound.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bundle::{BundleStatus, CompleteBundle, PendingBundle};
use super::stats::AggregatorStats;
use crate::error::AvatarError;
use crate::protocol::ResponsePart;

/// Configuration for the response aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Pending bundles older than this are evicted (default: 30s)
    pub max_age_ms: u64,

    /// How often the runtime sweeps stale bundles
    pub sweep_interval_ms: u64,

    /// How long an audio-complete bundle may wait for its expressions and
    /// animation parts before it is emitted anyway. 0 = emit on audio.
    /// The window runs from the first audio part; a repeated audio part
    /// replaces the payload but does not restart it.
    pub enrichment_grace_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 30_000,
            sweep_interval_ms: 1_000,
            enrichment_grace_ms: 0,
        }
    }
}

impl AggregatorConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn enrichment_grace(&self) -> Duration {
        Duration::from_millis(self.enrichment_grace_ms)
    }
}

/// Assembles correlated parts into complete bundles.
///
/// Owned by a single writer (the avatar runtime drains its inbox into it once
/// per tick), so ingestion for any one id is serialized by construction.
pub struct ResponseAggregator {
    config: AggregatorConfig,
    pending: HashMap<String, PendingBundle>,
    /// Ids already emitted, with emission time; late parts for these are dropped
    completed: HashMap<String, Duration>,
    stats: AggregatorStats,
}

impl ResponseAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        info!(
            "Response aggregator initialized: max age {}ms, grace {}ms",
            config.max_age_ms, config.enrichment_grace_ms
        );

        Self {
            config,
            pending: HashMap::new(),
            completed: HashMap::new(),
            stats: AggregatorStats::default(),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Store a part and return the bundle if this part completed it.
    pub fn ingest(
        &mut self,
        part: ResponsePart,
        now: Duration,
    ) -> Result<Option<CompleteBundle>, AvatarError> {
        let id = part.correlation_id().trim().to_string();
        if id.is_empty() {
            self.stats.rejected_parts += 1;
            warn!("Rejecting {:?} part with empty correlation id", part.kind());
            return Err(AvatarError::EmptyCorrelationId);
        }

        if self.completed.contains_key(&id) {
            self.stats.late_parts_dropped += 1;
            warn!(
                "Dropping late {:?} part for already emitted bundle {}",
                part.kind(),
                id
            );
            return Ok(None);
        }

        let kind = part.kind();
        let bundle = self
            .pending
            .entry(id.clone())
            .or_insert_with(|| PendingBundle::new(id.clone(), now));

        if bundle.store(part, now) {
            warn!("Replaced duplicate {:?} part for bundle {}", kind, id);
        } else {
            debug!("Stored {:?} part for bundle {}", kind, id);
        }

        Ok(self.try_complete(&id, now))
    }

    /// Emit bundles whose enrichment grace window has run out.
    ///
    /// Only relevant when `enrichment_grace_ms > 0`; otherwise bundles are
    /// emitted directly from `ingest`.
    pub fn poll_ready(&mut self, now: Duration) -> Vec<CompleteBundle> {
        let waiting: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, b)| b.is_complete())
            .map(|(id, _)| id.clone())
            .collect();

        waiting
            .into_iter()
            .filter_map(|id| self.try_complete(&id, now))
            .collect()
    }

    /// Remove bundles older than `max_age` that never received audio.
    ///
    /// Audio-complete bundles still inside their grace window are left for
    /// `poll_ready`. Returns the evicted correlation ids.
    pub fn sweep(&mut self, now: Duration, max_age: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, b)| !b.is_complete() && b.age(now) > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if let Some(bundle) = self.pending.remove(id) {
                let err = AvatarError::StaleBundle {
                    id: id.clone(),
                    age_ms: bundle.age(now).as_millis() as u64,
                };
                warn!("{}", err);
                self.stats.evicted += 1;
            }
        }

        // Emitted ids only need remembering while late parts can still show up
        self.completed
            .retain(|_, emitted_at| now.saturating_sub(*emitted_at) <= max_age);

        stale
    }

    pub fn record_fast_preview(&mut self) {
        self.stats.fast_previews += 1;
    }

    pub fn pending_status(&self, id: &str, now: Duration) -> Option<BundleStatus> {
        self.pending.get(id).map(|b| b.status(now))
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    /// Drop all pending state and statistics
    pub fn reset(&mut self) {
        self.pending.clear();
        self.completed.clear();
        self.stats = AggregatorStats::default();
    }

    fn try_complete(&mut self, id: &str, now: Duration) -> Option<CompleteBundle> {
        let ready = match self.pending.get(id) {
            Some(bundle) if bundle.is_complete() => {
                let grace = self.config.enrichment_grace();
                grace.is_zero()
                    || bundle.is_fully_enriched()
                    || bundle
                        .audio_at()
                        .is_some_and(|at| now.saturating_sub(at) >= grace)
            }
            _ => false,
        };
        if !ready {
            return None;
        }

        let complete = self.pending.remove(id)?.into_complete(now)?;
        let latency_ms = complete.completion_latency.as_secs_f64() * 1000.0;
        self.stats.record_completion(latency_ms);
        self.completed.insert(id.to_string(), now);

        info!(
            "Bundle {} complete in {:.0}ms (expressions={}, animation={})",
            id,
            latency_ms,
            complete.expressions.is_some(),
            complete.animation.is_some()
        );

        Some(complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AudioVisemes, ExpressionSet};

    fn audio(id: &str) -> ResponsePart {
        ResponsePart::AudioVisemes(AudioVisemes {
            message_id: id.to_string(),
            audio_url: "/audio/reply.wav".to_string(),
            visemas: vec![],
        })
    }

    fn expressions(id: &str) -> ResponsePart {
        ResponsePart::Expressions(ExpressionSet {
            message_id: id.to_string(),
            expresiones: vec![],
        })
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut agg = ResponseAggregator::new(AggregatorConfig::default());
        let err = agg.ingest(audio("  "), Duration::ZERO).unwrap_err();
        assert_eq!(err, AvatarError::EmptyCorrelationId);
        assert_eq!(agg.stats().rejected_parts, 1);
        assert!(agg.pending_ids().is_empty());
    }

    #[test]
    fn test_pending_status_tracks_flags() {
        let mut agg = ResponseAggregator::new(AggregatorConfig::default());
        agg.ingest(expressions("m1"), Duration::from_millis(10)).unwrap();

        let status = agg.pending_status("m1", Duration::from_millis(60)).unwrap();
        assert!(!status.has_audio);
        assert!(status.has_expressions);
        assert!(!status.is_complete);
        assert_eq!(status.age_ms, 50);
    }

    #[test]
    fn test_grace_window_delays_emission() {
        let config = AggregatorConfig {
            enrichment_grace_ms: 500,
            ..Default::default()
        };
        let mut agg = ResponseAggregator::new(config);

        assert!(agg.ingest(audio("m1"), Duration::ZERO).unwrap().is_none());
        assert!(agg.poll_ready(Duration::from_millis(499)).is_empty());

        let ready = agg.poll_ready(Duration::from_millis(500));
        assert_eq!(ready.len(), 1);
        assert!(ready[0].expressions.is_none());
    }

    #[test]
    fn test_grace_window_ends_when_fully_enriched() {
        use crate::protocol::{AnimationDirective, AnimationSequence};

        let config = AggregatorConfig {
            enrichment_grace_ms: 5_000,
            ..Default::default()
        };
        let mut agg = ResponseAggregator::new(config);
        agg.ingest(audio("m1"), Duration::ZERO).unwrap();
        agg.ingest(expressions("m1"), Duration::from_millis(5)).unwrap();

        let animation = ResponsePart::Animation(AnimationDirective {
            message_id: "m1".to_string(),
            sequence: AnimationSequence {
                sequence: "wave".to_string(),
                description: None,
                keyframes: None,
                vrma_file: Some("/animations/wave.vrma".to_string()),
                breathing: true,
                delay: 0.0,
                temporary: None,
            },
        });
        let done = agg.ingest(animation, Duration::from_millis(10)).unwrap();
        assert!(done.is_some());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut agg = ResponseAggregator::new(AggregatorConfig::default());
        agg.ingest(expressions("m1"), Duration::ZERO).unwrap();
        agg.record_fast_preview();
        agg.reset();
        assert!(agg.pending_ids().is_empty());
        assert_eq!(agg.stats(), &AggregatorStats::default());
    }
}
