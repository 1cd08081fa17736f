//! Response aggregation
//!
//! Merges the independently arriving parts of a reply (audio + visemes,
//! expressions, animation directive) into one playable bundle per
//! correlation id.

mod aggregator;
mod bundle;
mod stats;

pub use aggregator::{AggregatorConfig, ResponseAggregator};
pub use bundle::{BundleStatus, CompleteBundle, PendingBundle};
pub use stats::AggregatorStats;
