//! Named locks backed by Postgres transaction-scoped advisory locks.
//!
//! Each held lock owns an open transaction. Dropping the guard drops the
//! transaction, which rolls back and releases the lock, including when the
//! holder crashes and its connection goes away. Waiters return their
//! connection to the pool between attempts.

use std::time::Duration;

use async_trait::async_trait;
use feedsync_core::{LockError, LockGuard, LockManager};
use sqlx::PgPool;
use tokio::time::Instant;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PgLockManager {
    pool: PgPool,
    poll_interval: Duration,
}

impl PgLockManager {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

fn backend(e: sqlx::Error) -> LockError {
    LockError::Backend(e.to_string())
}

#[async_trait]
impl LockManager for PgLockManager {
    async fn lock(&self, name: &str, wait: Duration) -> Result<LockGuard, LockError> {
        let deadline = Instant::now() + wait;
        loop {
            // A waiter holds a connection only for the duration of one try.
            let mut tx = self.pool.begin().await.map_err(backend)?;
            let acquired: bool =
                sqlx::query_scalar("SELECT pg_try_advisory_xact_lock(hashtext($1))")
                    .bind(name)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(backend)?;
            if acquired {
                tracing::debug!(lock = name, "advisory lock acquired");
                return Ok(LockGuard::new(name, tx));
            }
            tx.rollback().await.map_err(backend)?;

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    waited: wait,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
