use pagepulse_analytics::ApiError;
use pagepulse_db::{PersistenceError, RetentionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConcurrencyError {
    #[error("another run holds the run lock (key {key})")]
    RunInProgress { key: i64 },
}

/// Why a pipeline run failed.
///
/// [`PipelineError::kind`] is the label stored in `run_windows.error_kind`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("analytics fetch failed: {0}")]
    Api(#[from] ApiError),

    #[error("persisting metric records failed: {0}")]
    Persistence(#[source] PersistenceError),

    #[error(transparent)]
    Retention(#[from] RetentionError),

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// The window was already completed by an earlier run; nothing was
    /// written.
    #[error("run window {run_window_id} already succeeded")]
    AlreadySucceeded { run_window_id: i64 },

    #[error("run exceeded its {timeout_secs}s timeout")]
    Timeout { timeout_secs: u64 },

    #[error("run status bookkeeping failed: {0}")]
    RunBookkeeping(#[source] PersistenceError),
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Api(e) => e.kind().as_str(),
            PipelineError::Persistence(e) => e.kind().as_str(),
            PipelineError::Retention(e) => e.as_str(),
            PipelineError::Concurrency(_) => "run_in_progress",
            PipelineError::AlreadySucceeded { .. } => "already_succeeded",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::RunBookkeeping(_) => "bookkeeping",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_delegates_to_stage_errors() {
        let err = PipelineError::from(ApiError::Auth {
            status: 401,
            message: "bad token".to_string(),
        });
        assert_eq!(err.kind(), "api_auth");

        let err = PipelineError::Persistence(PersistenceError::from(sqlx::Error::PoolTimedOut));
        assert_eq!(err.kind(), "db_timeout");

        let err = PipelineError::from(RetentionError::Deletion(PersistenceError::NotFound));
        assert_eq!(err.kind(), "retention_deletion");
    }

    #[test]
    fn kind_labels_controller_failures() {
        assert_eq!(PipelineError::Timeout { timeout_secs: 240 }.kind(), "timeout");
        assert_eq!(
            PipelineError::from(ConcurrencyError::RunInProgress { key: 7 }).kind(),
            "run_in_progress"
        );
        assert_eq!(
            PipelineError::RunBookkeeping(PersistenceError::NotFound).kind(),
            "bookkeeping"
        );
        assert_eq!(
            PipelineError::AlreadySucceeded { run_window_id: 3 }.kind(),
            "already_succeeded"
        );
    }

    #[test]
    fn timeout_message_names_the_limit() {
        let err = PipelineError::Timeout { timeout_secs: 240 };
        assert_eq!(err.to_string(), "run exceeded its 240s timeout");
    }
}
