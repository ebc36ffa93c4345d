//! `StateStore` over the `feed_flags` table.

use async_trait::async_trait;
use feedsync_core::{StateError, StateStore};
use serde_json::Value;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StateError {
    StateError::Backend(e.to_string())
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        sqlx::query_scalar::<_, Value>("SELECT flag_data FROM feed_flags WHERE flag_code = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        sqlx::query(
            "INSERT INTO feed_flags (flag_code, flag_data, last_update) \
             VALUES ($1, $2, now()) \
             ON CONFLICT (flag_code) DO UPDATE \
             SET flag_data = EXCLUDED.flag_data, last_update = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        sqlx::query("DELETE FROM feed_flags WHERE flag_code = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
