use std::time::Duration;

use pagepulse_core::RunWindow;
use pagepulse_db::RetentionReport;

use crate::PipelineError;

/// Counters of a succeeded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub window: RunWindow,
    /// API calls issued, one per metric chunk.
    pub requests: usize,
    pub rows_fetched: usize,
    pub records_written: u64,
    /// Records with at least one metric that failed coercion.
    pub flagged_records: usize,
    pub retention: RetentionReport,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(RunReport),
    /// `run_window_id` is `None` when the run failed before its window row
    /// was created, e.g. because the run lock was held.
    Failed {
        run_window_id: Option<i64>,
        error: PipelineError,
    },
}

impl RunOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }

    #[must_use]
    pub fn run_window_id(&self) -> Option<i64> {
        match self {
            RunOutcome::Succeeded(report) => Some(report.window.id),
            RunOutcome::Failed { run_window_id, .. } => *run_window_id,
        }
    }

    /// # Errors
    ///
    /// Returns the run's [`PipelineError`] if it failed.
    pub fn into_result(self) -> Result<RunReport, PipelineError> {
        match self {
            RunOutcome::Succeeded(report) => Ok(report),
            RunOutcome::Failed { error, .. } => Err(error),
        }
    }
}
