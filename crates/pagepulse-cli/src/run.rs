//! One-shot pipeline run and the API credential check.

use chrono::{DateTime, Utc};
use pagepulse_analytics::{AnalyticsClient, ClientSettings};
use pagepulse_core::AppConfig;
use pagepulse_pipeline::Pipeline;

/// Parses `--now`, accepting any RFC 3339 offset and converting to UTC.
pub(crate) fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

/// Runs the pipeline for the window ending at `now` and prints a summary.
///
/// # Errors
///
/// Returns the run's error if it failed, which makes the process exit
/// non-zero. The run window is already marked failed at that point.
pub(crate) async fn run_once(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_app_config(pool.clone(), config)?;
    let report = pipeline.run_pipeline(now).await.into_result()?;

    println!(
        "run {} succeeded: window {} .. {}",
        report.window.id,
        report.window.start.format("%Y-%m-%d %H:%M:%S UTC"),
        report.window.end.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    println!(
        "  requests {}, rows {}, records {} ({} flagged)",
        report.requests, report.rows_fetched, report.records_written, report.flagged_records
    );
    println!(
        "  rollup rows {}, expired records deleted {}, run windows pruned {}",
        report.retention.rollup_rows,
        report.retention.records_deleted,
        report.retention.run_windows_pruned
    );
    println!("  elapsed {} ms", report.elapsed.as_millis());
    Ok(())
}

/// # Errors
///
/// Returns an error if credentials are missing or the API rejects the call.
pub(crate) async fn run_check(config: &AppConfig) -> anyhow::Result<()> {
    let settings = ClientSettings::from_app_config(config)?;
    let property_id = settings.property_id.clone();
    let client = AnalyticsClient::new(settings)?;

    let rows = client.check_access().await?;
    println!("analytics API reachable for property {property_id} ({rows} row(s) returned)");
    Ok(())
}
