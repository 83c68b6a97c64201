use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel stored for a dimension value the API left empty.
pub const NOT_SET: &str = "(not set)";

/// One normalized `(run window, page, country)` snapshot, ready for
/// persistence.
///
/// Unique per `(run_window_id, page_path, country)`. Metric names in
/// `flagged_metrics` had a raw value that could not be coerced to an integer
/// and were stored as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetricRecord {
    pub run_window_id: i64,
    pub page_path: String,
    pub country: String,
    pub active_users: i64,
    pub page_views: i64,
    pub event_count: i64,
    pub conversions: i64,
    /// Metrics beyond the four with dedicated columns, keyed by snake_case name.
    pub extra_metrics: BTreeMap<String, i64>,
    pub flagged_metrics: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl RawMetricRecord {
    /// The `(page_path, country)` pair records are deduplicated on.
    #[must_use]
    pub fn dimension_key(&self) -> (&str, &str) {
        (&self.page_path, &self.country)
    }

    #[must_use]
    pub fn is_flagged(&self) -> bool {
        !self.flagged_metrics.is_empty()
    }
}
