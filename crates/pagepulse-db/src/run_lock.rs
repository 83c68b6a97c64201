//! Exclusive run lock backed by a Postgres session-level advisory lock.
//!
//! The lock lives on one pooled connection held by [`RunLock`] for the whole
//! run. [`RunLock::release`] unlocks and hands the connection back to the
//! pool. A guard dropped without release (panic, cancelled future) detaches
//! its connection from the pool and closes it; Postgres frees session
//! advisory locks when the session ends.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

use crate::PersistenceError;

pub struct RunLock {
    key: i64,
    conn: Option<PoolConnection<Postgres>>,
}

impl RunLock {
    /// Tries once to take the advisory lock `key`.
    ///
    /// Returns `Ok(None)` if another session holds it.
    ///
    /// # Errors
    ///
    /// Returns a classified [`PersistenceError`] if no connection can be
    /// acquired or the lock query fails.
    pub async fn try_acquire(pool: &PgPool, key: i64) -> Result<Option<Self>, PersistenceError> {
        let mut conn = pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;

        if !acquired {
            return Ok(None);
        }
        tracing::debug!(key, "run lock acquired");
        Ok(Some(Self {
            key,
            conn: Some(conn),
        }))
    }

    #[must_use]
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Unlocks and returns the connection to the pool.
    ///
    /// # Errors
    ///
    /// Returns a classified [`PersistenceError`] if the unlock query fails.
    /// The connection is closed in that case, which still frees the lock.
    pub async fn release(mut self) -> Result<(), PersistenceError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        match sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(true) => {
                tracing::debug!(key = self.key, "run lock released");
                Ok(())
            }
            Ok(false) => {
                tracing::warn!(key = self.key, "run lock was not held at release");
                drop(conn.detach());
                Ok(())
            }
            Err(e) => {
                drop(conn.detach());
                Err(e.into())
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(
                key = self.key,
                "run lock dropped without release, closing its connection"
            );
            drop(conn.detach());
        }
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("key", &self.key)
            .field("held", &self.conn.is_some())
            .finish()
    }
}
