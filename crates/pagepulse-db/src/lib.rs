use std::time::Duration;

use pagepulse_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// SQLSTATE raised when a statement is cancelled by `statement_timeout`.
const QUERY_CANCELED: &str = "57014";

// Path relative to crates/pagepulse-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

/// Coarse classification of database failures, recorded on failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceErrorKind {
    Connection,
    Constraint,
    Timeout,
}

impl PersistenceErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceErrorKind::Connection => "db_connection",
            PersistenceErrorKind::Constraint => "db_constraint",
            PersistenceErrorKind::Timeout => "db_timeout",
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("record not found")]
    NotFound,

    #[error("run window {id} is not in expected status '{expected_status}'")]
    InvalidRunTransition {
        id: i64,
        expected_status: &'static str,
    },

    #[error("run window {id} already succeeded")]
    WindowAlreadySucceeded { id: i64 },

    #[error("database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("database constraint violated: {0}")]
    Constraint(#[source] sqlx::Error),

    #[error("database operation timed out: {0}")]
    Timeout(#[source] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl PersistenceError {
    #[must_use]
    pub fn kind(&self) -> PersistenceErrorKind {
        match self {
            PersistenceError::Timeout(_) => PersistenceErrorKind::Timeout,
            PersistenceError::Constraint(_)
            | PersistenceError::NotFound
            | PersistenceError::InvalidRunTransition { .. }
            | PersistenceError::WindowAlreadySucceeded { .. } => PersistenceErrorKind::Constraint,
            PersistenceError::MissingDatabaseUrl
            | PersistenceError::Connection(_)
            | PersistenceError::Migration(_) => PersistenceErrorKind::Connection,
        }
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return PersistenceError::NotFound;
        }
        let sqlstate = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(std::borrow::Cow::into_owned);

        match sqlstate.as_deref() {
            _ if matches!(err, sqlx::Error::PoolTimedOut) => PersistenceError::Timeout(err),
            Some(QUERY_CANCELED) => PersistenceError::Timeout(err),
            Some(code) if code.starts_with("23") => PersistenceError::Constraint(err),
            _ => PersistenceError::Connection(err),
        }
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`PersistenceError::MissingDatabaseUrl`] for an empty URL, or a
/// classified error if the connection cannot be established.
pub async fn connect_pool(
    database_url: &str,
    config: PoolConfig,
) -> Result<PgPool, PersistenceError> {
    if database_url.trim().is_empty() {
        return Err(PersistenceError::MissingDatabaseUrl);
    }
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`PersistenceError::Migration`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, PersistenceError> {
    // The _sqlx_migrations table may not exist yet on a fresh database;
    // treat absence as zero applied.
    let applied_before = count_applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let applied_after = count_applied_migrations(pool).await;

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

async fn count_applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns a classified [`PersistenceError`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), PersistenceError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}


pub mod metric_records;
pub mod retention;
pub mod rollups;
pub mod run_lock;
pub mod run_windows;
pub mod stats;

pub use metric_records::{
    count_records_for_window, list_records_for_window, upsert_metric_records, MetricRecordRow,
};
pub use retention::{cleanup_and_aggregate, RetentionError, RetentionPolicy, RetentionReport};
pub use rollups::{list_hourly_rollups, rebuild_bucket, HourlyRollupRow};
pub use run_lock::RunLock;
pub use run_windows::{
    complete_run_window, create_run_window, fail_run_window, get_run_window, list_run_windows,
    start_run_window, RunWindowRow,
};
pub use stats::{pipeline_summary, PipelineSummary, TableSummary};
