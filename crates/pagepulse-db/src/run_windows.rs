//! Database operations for `run_windows`.

use chrono::{DateTime, Utc};
use pagepulse_core::{RunStatus, RunWindow, UnknownRunStatus, WindowBounds};
use sqlx::PgPool;
use uuid::Uuid;

use crate::PersistenceError;

const RUN_WINDOW_COLUMNS: &str = "id, public_id, window_start, window_end, status, \
     started_at, completed_at, records_written, error_kind, error_message, created_at";

/// A row from the `run_windows` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunWindowRow {
    pub id: i64,
    pub public_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_written: i64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunWindowRow {
    /// # Errors
    ///
    /// Returns [`UnknownRunStatus`] if the stored text is not a known status.
    pub fn status(&self) -> Result<RunStatus, UnknownRunStatus> {
        self.status.parse()
    }

    #[must_use]
    pub fn window(&self) -> RunWindow {
        RunWindow::new(
            self.id,
            WindowBounds {
                start: self.window_start,
                end: self.window_end,
            },
        )
    }
}

/// Claims the run window for `bounds` in `pending` status.
///
/// Bounds identify a window, so a retry reuses the row of an earlier attempt.
/// A `pending`, `running` or `failed` row is reset to `pending` and the
/// records it already holds are deleted, leaving the retry in the same state
/// as a first attempt. Callers hold the run lock, so a `running` row can only
/// have been left behind by a process that died mid-run.
///
/// # Errors
///
/// Returns [`PersistenceError::WindowAlreadySucceeded`] if the window has
/// already completed; its row and records are left untouched.
/// Returns [`PersistenceError::Constraint`] if the bounds are not ordered,
/// or another classified error if a statement fails.
pub async fn create_run_window(
    pool: &PgPool,
    bounds: &WindowBounds,
) -> Result<RunWindowRow, PersistenceError> {
    let public_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query_as::<_, RunWindowRow>(&format!(
        "INSERT INTO run_windows (public_id, window_start, window_end, status) \
         VALUES ($1, $2, $3, 'pending') \
         ON CONFLICT (window_start, window_end) DO UPDATE \
         SET status = 'pending', started_at = NULL, completed_at = NULL, \
             records_written = 0, error_kind = NULL, error_message = NULL \
         WHERE run_windows.status <> 'succeeded' \
         RETURNING {RUN_WINDOW_COLUMNS}"
    ))
    .bind(public_id)
    .bind(bounds.start)
    .bind(bounds.end)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = claimed else {
        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM run_windows WHERE window_start = $1 AND window_end = $2",
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .fetch_one(&mut *tx)
        .await?;
        return Err(PersistenceError::WindowAlreadySucceeded { id });
    };

    let cleared = sqlx::query("DELETE FROM page_metric_records WHERE run_window_id = $1")
        .bind(row.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    if cleared > 0 {
        tracing::info!(
            run_window_id = row.id,
            records_cleared = cleared,
            "run window retried, records of the earlier attempt cleared"
        );
    }
    Ok(row)
}

/// Marks a run window as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`PersistenceError::InvalidRunTransition`] if the window is not
/// `pending`.
pub async fn start_run_window(pool: &PgPool, id: i64) -> Result<(), PersistenceError> {
    let result = sqlx::query(
        "UPDATE run_windows \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PersistenceError::InvalidRunTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Marks a run window as `succeeded`, setting `completed_at` and
/// `records_written`.
///
/// # Errors
///
/// Returns [`PersistenceError::InvalidRunTransition`] if the window is not
/// `running`.
pub async fn complete_run_window(
    pool: &PgPool,
    id: i64,
    records_written: i64,
) -> Result<(), PersistenceError> {
    let result = sqlx::query(
        "UPDATE run_windows \
         SET status = 'succeeded', completed_at = NOW(), records_written = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(records_written)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PersistenceError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a `pending` or `running` window as `failed` with an error kind and
/// message.
///
/// # Errors
///
/// Returns [`PersistenceError::InvalidRunTransition`] if the window is
/// already terminal.
pub async fn fail_run_window(
    pool: &PgPool,
    id: i64,
    error_kind: &str,
    error_message: &str,
) -> Result<(), PersistenceError> {
    let result = sqlx::query(
        "UPDATE run_windows \
         SET status = 'failed', completed_at = NOW(), error_kind = $1, error_message = $2 \
         WHERE id = $3 AND status IN ('pending', 'running')",
    )
    .bind(error_kind)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PersistenceError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run window by its internal `id`.
///
/// # Errors
///
/// Returns [`PersistenceError::NotFound`] if no row exists with the given `id`.
pub async fn get_run_window(pool: &PgPool, id: i64) -> Result<RunWindowRow, PersistenceError> {
    sqlx::query_as::<_, RunWindowRow>(&format!(
        "SELECT {RUN_WINDOW_COLUMNS} FROM run_windows WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(PersistenceError::NotFound)
}

/// Returns the most recent `limit` run windows, newest first.
///
/// # Errors
///
/// Returns a classified [`PersistenceError`] if the query fails.
pub async fn list_run_windows(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<RunWindowRow>, PersistenceError> {
    let rows = sqlx::query_as::<_, RunWindowRow>(&format!(
        "SELECT {RUN_WINDOW_COLUMNS} FROM run_windows \
         ORDER BY window_end DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
