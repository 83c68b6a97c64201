//! Raw-record retention and rollup maintenance, run once per pipeline run.

use chrono::{DateTime, Duration, Utc};
use pagepulse_core::{AppConfig, RunWindow};
use sqlx::PgPool;
use thiserror::Error;

use crate::rollups::rebuild_bucket;
use crate::PersistenceError;

/// Horizons are clamped to a century.
const MAX_RETENTION_DAYS: u64 = 36_500;

/// How long raw records and run history are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub raw_retention: Duration,
    pub run_history_retention: Duration,
}

impl RetentionPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let days = config.run_history_retention_days.min(MAX_RETENTION_DAYS);
        let hours = config.raw_retention_hours.min(MAX_RETENTION_DAYS * 24);
        Self {
            raw_retention: Duration::hours(i64::try_from(hours).unwrap_or(0)),
            run_history_retention: Duration::days(i64::try_from(days).unwrap_or(0)),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            raw_retention: Duration::hours(24),
            run_history_retention: Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Rollup rows written for the current window's bucket.
    pub rollup_rows: u64,
    pub records_deleted: u64,
    /// Buckets recomputed because raw records in them were deleted.
    pub buckets_rebuilt: usize,
    pub run_windows_pruned: u64,
}

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("rollup aggregation failed: {0}")]
    Aggregation(#[source] PersistenceError),

    #[error("retention deletion failed: {0}")]
    Deletion(#[source] PersistenceError),
}

impl RetentionError {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionError::Aggregation(_) => "retention_aggregation",
            RetentionError::Deletion(_) => "retention_deletion",
        }
    }
}

/// Refreshes rollups for `window` and applies the retention policy.
///
/// Steps, all relative to `window.end`:
/// 1. rebuild the bucket containing the window start;
/// 2. delete raw records whose run window ended before
///    `window.end - raw_retention`;
/// 3. rebuild every bucket that lost records in step 2;
/// 4. delete terminal run windows older than `run_history_retention` that
///    have no records left.
///
/// A failure in step 1 does not stop steps 2 to 4; its error is returned
/// after they complete.
///
/// # Errors
///
/// Returns [`RetentionError::Deletion`] if step 2 or 4 fails and
/// [`RetentionError::Aggregation`] if step 1 or 3 fails.
pub async fn cleanup_and_aggregate(
    pool: &PgPool,
    window: &RunWindow,
    policy: &RetentionPolicy,
) -> Result<RetentionReport, RetentionError> {
    let mut report = RetentionReport::default();

    let current = rebuild_bucket(pool, window.bucket_start()).await;
    match &current {
        Ok(rows) => report.rollup_rows = *rows,
        Err(e) => tracing::error!(
            run_window_id = window.id,
            error = %e,
            "current bucket rebuild failed, continuing with retention"
        ),
    }

    let raw_cutoff = cutoff(window.end, policy.raw_retention);
    let (deleted, touched_buckets) = delete_expired_records(pool, raw_cutoff)
        .await
        .map_err(RetentionError::Deletion)?;
    report.records_deleted = deleted;

    for bucket in &touched_buckets {
        rebuild_bucket(pool, *bucket)
            .await
            .map_err(RetentionError::Aggregation)?;
    }
    report.buckets_rebuilt = touched_buckets.len();

    let history_cutoff = cutoff(window.end, policy.run_history_retention);
    report.run_windows_pruned = prune_run_windows(pool, history_cutoff)
        .await
        .map_err(RetentionError::Deletion)?;

    current.map_err(RetentionError::Aggregation)?;

    tracing::debug!(
        run_window_id = window.id,
        rollup_rows = report.rollup_rows,
        records_deleted = report.records_deleted,
        buckets_rebuilt = report.buckets_rebuilt,
        run_windows_pruned = report.run_windows_pruned,
        "retention applied"
    );
    Ok(report)
}

fn cutoff(now: DateTime<Utc>, horizon: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(horizon)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Deletes raw records of run windows that ended before `cutoff`.
///
/// Returns the deleted count and the distinct UTC hour buckets they belonged
/// to.
async fn delete_expired_records(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<(u64, Vec<DateTime<Utc>>), PersistenceError> {
    let mut tx = pool.begin().await?;

    let buckets: Vec<(DateTime<Utc>, i64)> = sqlx::query_as(
        "WITH doomed AS ( \
             DELETE FROM page_metric_records r \
             USING run_windows w \
             WHERE r.run_window_id = w.id AND w.window_end < $1 \
             RETURNING w.window_start \
         ) \
         SELECT date_trunc('hour', window_start AT TIME ZONE 'UTC') AT TIME ZONE 'UTC' AS bucket, \
                COUNT(*) AS deleted \
         FROM doomed \
         GROUP BY 1 \
         ORDER BY 1",
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    let deleted = buckets
        .iter()
        .map(|(_, n)| u64::try_from(*n).unwrap_or(0))
        .sum();
    Ok((deleted, buckets.into_iter().map(|(b, _)| b).collect()))
}

/// Deletes terminal run windows that ended before `cutoff` and own no
/// records.
async fn prune_run_windows(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, PersistenceError> {
    let result = sqlx::query(
        "DELETE FROM run_windows w \
         WHERE w.window_end < $1 \
           AND w.status IN ('succeeded', 'failed') \
           AND NOT EXISTS ( \
               SELECT 1 FROM page_metric_records r WHERE r.run_window_id = w.id \
           )",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_keeps_a_day_of_raw_data() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.raw_retention, Duration::hours(24));
        assert_eq!(policy.run_history_retention, Duration::days(30));
    }

    #[test]
    fn error_labels_are_stable() {
        let err = RetentionError::Deletion(PersistenceError::NotFound);
        assert_eq!(err.as_str(), "retention_deletion");
        let err = RetentionError::Aggregation(PersistenceError::NotFound);
        assert_eq!(err.as_str(), "retention_aggregation");
    }
}
