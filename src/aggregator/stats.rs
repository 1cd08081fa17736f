use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running statistics of the response aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatorStats {
    /// Fast previews routed straight to playback
    pub fast_previews: u64,

    /// Bundles emitted as complete
    pub completed: u64,

    /// Bundles abandoned by the sweep
    pub evicted: u64,

    /// Parts that arrived after their bundle was already emitted
    pub late_parts_dropped: u64,

    /// Parts rejected for an empty correlation id
    pub rejected_parts: u64,

    /// Mean time from first part to emission, in milliseconds
    pub average_completion_ms: f64,

    /// When the last bundle was emitted
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl AggregatorStats {
    /// Fold one completion latency into the running mean.
    ///
    /// Incremental form: `mean += (x - mean) / n`, no stored sum.
    pub fn record_completion(&mut self, latency_ms: f64) {
        self.completed += 1;
        self.average_completion_ms += (latency_ms - self.average_completion_ms) / self.completed as f64;
        self.last_completed_at = Some(Utc::now());
    }
}
