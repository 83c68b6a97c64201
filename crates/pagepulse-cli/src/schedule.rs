//! Stand-in orchestrator: runs the pipeline on a cron schedule.
//!
//! Overlapping triggers are harmless; a run that finds the lock held fails
//! fast without writing anything.

use std::sync::Arc;

use chrono::Utc;
use pagepulse_core::AppConfig;
use pagepulse_pipeline::{Pipeline, PipelineError, RunOutcome};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Starts the scheduler and blocks until ctrl-c or SIGTERM.
///
/// # Errors
///
/// Returns an error if the pipeline cannot be built from `config` or the
/// scheduler cannot be started or shut down.
pub(crate) async fn run_schedule(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_app_config(pool, config)?);
    let mut scheduler = build_scheduler(pipeline, &config.run_schedule).await?;
    tracing::info!(schedule = %config.run_schedule, "scheduler started");

    shutdown_signal().await;
    scheduler.shutdown().await?;
    Ok(())
}

/// Builds and starts a scheduler with one pipeline job on `schedule`.
///
/// The returned handle must be kept alive; dropping it stops the job.
async fn build_scheduler(
    pipeline: Arc<Pipeline>,
    schedule: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            scheduled_run(&pipeline).await;
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn scheduled_run(pipeline: &Pipeline) {
    match pipeline.run_pipeline(Utc::now()).await {
        RunOutcome::Succeeded(report) => tracing::info!(
            run_window_id = report.window.id,
            records_written = report.records_written,
            "scheduler: run complete"
        ),
        RunOutcome::Failed {
            error: PipelineError::Concurrency(_),
            ..
        } => tracing::info!("scheduler: previous run still in progress, trigger skipped"),
        RunOutcome::Failed {
            error: PipelineError::AlreadySucceeded { run_window_id },
            ..
        } => tracing::info!(run_window_id, "scheduler: window already covered, trigger skipped"),
        RunOutcome::Failed {
            run_window_id,
            error,
        } => tracing::error!(
            run_window_id,
            error_kind = error.kind(),
            error = %error,
            "scheduler: run failed"
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping scheduler");
}
