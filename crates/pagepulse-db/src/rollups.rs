//! Hourly rollups in `page_metrics_hourly`, rebuilt from raw records.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::PersistenceError;

/// A row from the `page_metrics_hourly` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct HourlyRollupRow {
    pub page_path: String,
    pub country: String,
    pub bucket_start: DateTime<Utc>,
    pub snapshot_count: i64,
    pub active_users_sum: i64,
    pub active_users_peak: i64,
    pub page_views: i64,
    pub event_count: i64,
    pub conversions: i64,
    pub flagged_count: i64,
}

/// Recomputes every rollup row of the hour starting at `bucket_start` from
/// the raw records whose run window starts in that hour.
///
/// Runs as `DELETE` + `INSERT … SELECT` in one transaction, so readers see
/// either the old or the new bucket. A bucket with no raw records ends up
/// empty. Returns the number of rollup rows written.
///
/// # Errors
///
/// Returns a classified [`PersistenceError`] if either statement fails; the
/// bucket is left unchanged in that case.
pub async fn rebuild_bucket(
    pool: &PgPool,
    bucket_start: DateTime<Utc>,
) -> Result<u64, PersistenceError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM page_metrics_hourly WHERE bucket_start = $1")
        .bind(bucket_start)
        .execute(&mut *tx)
        .await?;

    let inserted = sqlx::query(
        "INSERT INTO page_metrics_hourly \
             (page_path, country, bucket_start, snapshot_count, active_users_sum, \
              active_users_peak, page_views, event_count, conversions, flagged_count, \
              refreshed_at) \
         SELECT r.page_path, r.country, $1, \
                COUNT(*), \
                SUM(r.active_users)::BIGINT, \
                MAX(r.active_users), \
                SUM(r.page_views)::BIGINT, \
                SUM(r.event_count)::BIGINT, \
                SUM(r.conversions)::BIGINT, \
                COUNT(*) FILTER (WHERE cardinality(r.flagged_metrics) > 0), \
                NOW() \
         FROM page_metric_records r \
         JOIN run_windows w ON w.id = r.run_window_id \
         WHERE w.window_start >= $1 \
           AND w.window_start < $1 + INTERVAL '1 hour' \
         GROUP BY r.page_path, r.country",
    )
    .bind(bucket_start)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok(inserted)
}

/// Returns the rollup rows of one bucket, ordered by `(page_path, country)`.
///
/// # Errors
///
/// Returns a classified [`PersistenceError`] if the query fails.
pub async fn list_hourly_rollups(
    pool: &PgPool,
    bucket_start: DateTime<Utc>,
) -> Result<Vec<HourlyRollupRow>, PersistenceError> {
    let rows = sqlx::query_as::<_, HourlyRollupRow>(
        "SELECT page_path, country, bucket_start, snapshot_count, active_users_sum, \
                active_users_peak, page_views, event_count, conversions, flagged_count \
         FROM page_metrics_hourly \
         WHERE bucket_start = $1 \
         ORDER BY page_path, country",
    )
    .bind(bucket_start)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
