//! Postgres persistence for the sync engine: the `feed_flags` key-value table
//! and advisory locks.

use std::time::{Duration, Instant};

use feedsync_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub mod flags;
pub mod locks;

pub use flags::PgStateStore;
pub use locks::PgLockManager;

// Path relative to crates/feedsync-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Pool sizing from the `FEEDSYNC_DB_*` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// Never above `max_connections`.
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections.min(config.db_max_connections),
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs),
        }
    }

    fn options(self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the first connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, DbError> {
    let pool = config.options().connect(database_url).await?;
    tracing::debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "postgres pool connected"
    );
    Ok(pool)
}

/// Applies pending migrations and returns the versions applied by this call.
///
/// # Errors
///
/// Returns [`DbError`] if a migration fails or the migration table cannot be read.
pub async fn run_migrations(pool: &PgPool) -> Result<Vec<i64>, DbError> {
    let before = applied_versions(pool).await?;
    MIGRATOR.run(pool).await?;
    let applied: Vec<i64> = applied_versions(pool)
        .await?
        .into_iter()
        .filter(|version| !before.contains(version))
        .collect();
    if !applied.is_empty() {
        tracing::info!(?applied, "migrations applied");
    }
    Ok(applied)
}

async fn applied_versions(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
    // The bookkeeping table is absent on a fresh database.
    let tracked: bool =
        sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
            .fetch_one(pool)
            .await?;
    if !tracked {
        return Ok(Vec::new());
    }
    sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
        .fetch_all(pool)
        .await
}

/// Round-trips a `SELECT 1` and returns how long it took.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if no connection can run the query.
pub async fn ping(pool: &PgPool) -> Result<Duration, DbError> {
    let started = Instant::now();
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(started.elapsed())
}
