//! Read-only summary queries behind the `status` command.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::PersistenceError;

/// Row total and timestamp range of one table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TableSummary {
    pub table_name: String,
    pub row_count: i64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub tables: Vec<TableSummary>,
    pub succeeded_runs: i64,
    pub failed_runs: i64,
    /// End of the most recent succeeded run window, if any.
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Summarises row counts and time ranges across the pipeline tables.
///
/// Timestamps are `window_end` for run windows, `fetched_at` for raw records
/// and `bucket_start` for hourly rollups.
///
/// # Errors
///
/// Returns a classified [`PersistenceError`] if any query fails.
pub async fn pipeline_summary(pool: &PgPool) -> Result<PipelineSummary, PersistenceError> {
    let tables = sqlx::query_as::<_, TableSummary>(
        "SELECT 'run_windows' AS table_name, COUNT(*) AS row_count, \
                MIN(window_end) AS earliest, MAX(window_end) AS latest \
         FROM run_windows \
         UNION ALL \
         SELECT 'page_metric_records', COUNT(*), MIN(fetched_at), MAX(fetched_at) \
         FROM page_metric_records \
         UNION ALL \
         SELECT 'page_metrics_hourly', COUNT(*), MIN(bucket_start), MAX(bucket_start) \
         FROM page_metrics_hourly",
    )
    .fetch_all(pool)
    .await?;

    let (succeeded_runs, failed_runs, last_success_at): (i64, i64, Option<DateTime<Utc>>) =
        sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE status = 'succeeded'), \
                    COUNT(*) FILTER (WHERE status = 'failed'), \
                    MAX(window_end) FILTER (WHERE status = 'succeeded') \
             FROM run_windows",
        )
        .fetch_one(pool)
        .await?;

    Ok(PipelineSummary {
        tables,
        succeeded_runs,
        failed_runs,
        last_success_at,
    })
}
