//! `status`: recent run windows and per-table statistics.

use chrono::{DateTime, Utc};

fn fmt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// Prints the `limit` most recent run windows, then the pipeline summary.
///
/// # Errors
///
/// Returns an error if a database query fails.
pub(crate) async fn run_status(pool: &sqlx::PgPool, limit: u32) -> anyhow::Result<()> {
    let runs = pagepulse_db::list_run_windows(pool, i64::from(limit)).await?;

    if runs.is_empty() {
        println!("no run windows recorded; run `pagepulse-cli run` first");
    } else {
        println!(
            "{:<8}{:<18}{:<18}{:<11}{:<9}ERROR",
            "ID", "WINDOW START", "WINDOW END", "STATUS", "RECORDS"
        );
        for run in &runs {
            let error = match (&run.error_kind, &run.error_message) {
                (Some(kind), Some(message)) => format!("{kind}: {message}"),
                (Some(kind), None) => kind.clone(),
                _ => String::new(),
            };
            println!(
                "{:<8}{:<18}{:<18}{:<11}{:<9}{}",
                run.id,
                fmt_ts(Some(run.window_start)),
                fmt_ts(Some(run.window_end)),
                run.status,
                run.records_written,
                error
            );
        }
    }

    let summary = pagepulse_db::pipeline_summary(pool).await?;
    println!();
    println!("{:<22}{:>10}  {:<18}LATEST", "TABLE", "ROWS", "EARLIEST");
    for table in &summary.tables {
        println!(
            "{:<22}{:>10}  {:<18}{}",
            table.table_name,
            table.row_count,
            fmt_ts(table.earliest),
            fmt_ts(table.latest)
        );
    }
    println!();
    println!(
        "succeeded runs: {}, failed runs: {}, last success: {}",
        summary.succeeded_runs,
        summary.failed_runs,
        fmt_ts(summary.last_success_at)
    );
    Ok(())
}
