//! Database operations for `page_metric_records`.

use chrono::{DateTime, Utc};
use pagepulse_core::RawMetricRecord;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::PersistenceError;

/// A row from the `page_metric_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetricRecordRow {
    pub run_window_id: i64,
    pub page_path: String,
    pub country: String,
    pub active_users: i64,
    pub page_views: i64,
    pub event_count: i64,
    pub conversions: i64,
    /// JSON object of snake_case metric name to integer value.
    pub extra_metrics: serde_json::Value,
    pub flagged_metrics: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Inserts or updates `records` in one transaction.
///
/// Conflicts on `(run_window_id, page_path, country)` overwrite the metric
/// columns, so submitting the same batch twice leaves the table unchanged.
/// Returns the number of rows inserted or updated. If any statement fails
/// the whole batch is rolled back.
///
/// # Errors
///
/// Returns [`PersistenceError::Constraint`] if a record references a missing
/// run window, or another classified error if the database fails.
pub async fn upsert_metric_records(
    pool: &PgPool,
    records: &[RawMetricRecord],
) -> Result<u64, PersistenceError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut written = 0u64;

    for record in records {
        let result = sqlx::query(
            "INSERT INTO page_metric_records \
                 (run_window_id, page_path, country, active_users, page_views, event_count, \
                  conversions, extra_metrics, flagged_metrics, fetched_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (run_window_id, page_path, country) DO UPDATE SET \
                 active_users    = EXCLUDED.active_users, \
                 page_views      = EXCLUDED.page_views, \
                 event_count     = EXCLUDED.event_count, \
                 conversions     = EXCLUDED.conversions, \
                 extra_metrics   = EXCLUDED.extra_metrics, \
                 flagged_metrics = EXCLUDED.flagged_metrics, \
                 fetched_at      = EXCLUDED.fetched_at",
        )
        .bind(record.run_window_id)
        .bind(&record.page_path)
        .bind(&record.country)
        .bind(record.active_users)
        .bind(record.page_views)
        .bind(record.event_count)
        .bind(record.conversions)
        .bind(Json(&record.extra_metrics))
        .bind(&record.flagged_metrics)
        .bind(record.fetched_at)
        .execute(&mut *tx)
        .await?;

        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Returns every record of one run window, ordered by `(page_path, country)`.
///
/// # Errors
///
/// Returns a classified [`PersistenceError`] if the query fails.
pub async fn list_records_for_window(
    pool: &PgPool,
    run_window_id: i64,
) -> Result<Vec<MetricRecordRow>, PersistenceError> {
    let rows = sqlx::query_as::<_, MetricRecordRow>(
        "SELECT run_window_id, page_path, country, active_users, page_views, event_count, \
                conversions, extra_metrics, flagged_metrics, fetched_at \
         FROM page_metric_records \
         WHERE run_window_id = $1 \
         ORDER BY page_path, country",
    )
    .bind(run_window_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns a classified [`PersistenceError`] if the query fails.
pub async fn count_records_for_window(
    pool: &PgPool,
    run_window_id: i64,
) -> Result<i64, PersistenceError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM page_metric_records WHERE run_window_id = $1",
    )
    .bind(run_window_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
