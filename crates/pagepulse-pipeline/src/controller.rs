//! Drives one run: lock, window bookkeeping, then fetch, normalize, upsert
//! and retention under an overall timeout.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use pagepulse_analytics::{normalize, AnalyticsClient, ClientSettings};
use pagepulse_core::{AppConfig, MetricQuery, RunWindow, WindowBounds};
use pagepulse_db::{
    cleanup_and_aggregate, complete_run_window, create_run_window, fail_run_window,
    start_run_window, upsert_metric_records, PersistenceError, RetentionPolicy, RunLock,
};
use sqlx::PgPool;

use crate::{ConcurrencyError, PipelineError, RunOutcome, RunReport};

/// Run-level knobs, separate from the client's own settings.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub interval: chrono::Duration,
    pub timeout: Duration,
    pub lock_key: i64,
    pub retention: RetentionPolicy,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            interval: config.run_interval(),
            timeout: config.run_timeout(),
            lock_key: config.run_lock_key,
            retention: RetentionPolicy::from_app_config(config),
        }
    }
}

pub struct Pipeline {
    pool: PgPool,
    client: AnalyticsClient,
    query: MetricQuery,
    settings: PipelineSettings,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        pool: PgPool,
        client: AnalyticsClient,
        query: MetricQuery,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            pool,
            client,
            query,
            settings,
        }
    }

    /// Builds the client and settings from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Api`] if the property id or access token is
    /// missing or the HTTP client cannot be built.
    pub fn from_app_config(pool: PgPool, config: &AppConfig) -> Result<Self, PipelineError> {
        let client = AnalyticsClient::new(ClientSettings::from_app_config(config)?)?;
        Ok(Self::new(
            pool,
            client,
            config.metric_query.clone(),
            PipelineSettings::from_app_config(config),
        ))
    }

    /// The window a run started at `now` owns.
    #[must_use]
    pub fn window_bounds(&self, now: DateTime<Utc>) -> WindowBounds {
        WindowBounds::ending_at(now, self.settings.interval)
    }

    /// Executes one run for the window ending at `now`.
    ///
    /// Never returns early without a terminal status: if a window row was
    /// created it ends `succeeded` or `failed` (unless marking it failed
    /// itself fails, which is logged). The run lock is released on every
    /// path.
    pub async fn run_pipeline(&self, now: DateTime<Utc>) -> RunOutcome {
        let bounds = self.window_bounds(now);
        let key = self.settings.lock_key;

        let lock = match RunLock::try_acquire(&self.pool, key).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                tracing::warn!(
                    lock_key = key,
                    window_start = %bounds.start,
                    window_end = %bounds.end,
                    "run skipped, another run holds the lock"
                );
                return RunOutcome::Failed {
                    run_window_id: None,
                    error: ConcurrencyError::RunInProgress { key }.into(),
                };
            }
            Err(e) => {
                tracing::error!(lock_key = key, error = %e, "could not acquire run lock");
                return RunOutcome::Failed {
                    run_window_id: None,
                    error: PipelineError::RunBookkeeping(e),
                };
            }
        };

        let outcome = self.run_locked(bounds).await;

        if let Err(e) = lock.release().await {
            tracing::warn!(lock_key = key, error = %e, "run lock release failed");
        }
        outcome
    }

    async fn run_locked(&self, bounds: WindowBounds) -> RunOutcome {
        let started = Instant::now();

        let window = match create_run_window(&self.pool, &bounds).await {
            Ok(row) => row.window(),
            Err(PersistenceError::WindowAlreadySucceeded { id }) => {
                tracing::warn!(
                    run_window_id = id,
                    window_start = %bounds.start,
                    window_end = %bounds.end,
                    "run skipped, window already succeeded"
                );
                return RunOutcome::Failed {
                    run_window_id: Some(id),
                    error: PipelineError::AlreadySucceeded { run_window_id: id },
                };
            }
            Err(e) => {
                tracing::error!(error = %e, "could not create run window");
                return RunOutcome::Failed {
                    run_window_id: None,
                    error: PipelineError::RunBookkeeping(e),
                };
            }
        };

        if let Err(e) = start_run_window(&self.pool, window.id).await {
            let error = PipelineError::RunBookkeeping(e);
            fail_run_best_effort(&self.pool, window.id, &error).await;
            return RunOutcome::Failed {
                run_window_id: Some(window.id),
                error,
            };
        }

        tracing::info!(
            run_window_id = window.id,
            window_start = %window.start,
            window_end = %window.end,
            "run started"
        );

        let staged = tokio::time::timeout(self.settings.timeout, self.run_stages(&window)).await;
        let result = staged.unwrap_or_else(|_| {
            Err(PipelineError::Timeout {
                timeout_secs: self.settings.timeout.as_secs(),
            })
        });

        let mut report = match result {
            Ok(report) => report,
            Err(error) => {
                tracing::error!(
                    run_window_id = window.id,
                    error_kind = error.kind(),
                    error = %error,
                    elapsed_ms = elapsed_ms(started),
                    "run failed"
                );
                fail_run_best_effort(&self.pool, window.id, &error).await;
                return RunOutcome::Failed {
                    run_window_id: Some(window.id),
                    error,
                };
            }
        };

        let written = i64::try_from(report.records_written).unwrap_or(i64::MAX);
        if let Err(e) = complete_run_window(&self.pool, window.id, written).await {
            let error = PipelineError::RunBookkeeping(e);
            tracing::error!(
                run_window_id = window.id,
                error = %error,
                "could not mark run succeeded"
            );
            fail_run_best_effort(&self.pool, window.id, &error).await;
            return RunOutcome::Failed {
                run_window_id: Some(window.id),
                error,
            };
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            run_window_id = window.id,
            requests = report.requests,
            records_written = report.records_written,
            flagged_records = report.flagged_records,
            records_deleted = report.retention.records_deleted,
            elapsed_ms = elapsed_ms(started),
            "run succeeded"
        );
        RunOutcome::Succeeded(report)
    }

    async fn run_stages(&self, window: &RunWindow) -> Result<RunReport, PipelineError> {
        let stage = Instant::now();
        let fetched = self.client.fetch(&self.query, window).await?;
        tracing::info!(
            run_window_id = window.id,
            requests = fetched.requests,
            rows = fetched.rows.len(),
            elapsed_ms = elapsed_ms(stage),
            "fetch stage done"
        );

        let records = normalize(&fetched, window);
        let flagged_records = records.iter().filter(|r| r.is_flagged()).count();
        if flagged_records > 0 {
            tracing::warn!(
                run_window_id = window.id,
                flagged_records,
                "some metric values could not be coerced and were stored as zero"
            );
        }

        let stage = Instant::now();
        let records_written = upsert_metric_records(&self.pool, &records)
            .await
            .map_err(PipelineError::Persistence)?;
        tracing::info!(
            run_window_id = window.id,
            records = records.len(),
            records_written,
            elapsed_ms = elapsed_ms(stage),
            "persist stage done"
        );

        let stage = Instant::now();
        let retention = cleanup_and_aggregate(&self.pool, window, &self.settings.retention).await?;
        tracing::info!(
            run_window_id = window.id,
            rollup_rows = retention.rollup_rows,
            records_deleted = retention.records_deleted,
            elapsed_ms = elapsed_ms(stage),
            "retention stage done"
        );

        Ok(RunReport {
            window: *window,
            requests: fetched.requests,
            rows_fetched: fetched.rows.len(),
            records_written,
            flagged_records,
            retention,
            elapsed: Duration::ZERO,
        })
    }
}

/// Marks the window failed; a failure to do so is logged, not returned, so
/// it never replaces the run's own error.
async fn fail_run_best_effort(pool: &PgPool, run_window_id: i64, error: &PipelineError) {
    if let Err(mark_err) =
        fail_run_window(pool, run_window_id, error.kind(), &error.to_string()).await
    {
        tracing::error!(
            run_window_id,
            error = %mark_err,
            "failed to mark run window as failed"
        );
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
