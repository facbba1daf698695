//! PostgreSQL implementation of the vault's key-value store.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use storelink_vault::{KeyValueStore, StoreError};

/// Key-value store over the `kv_entries` table.
///
/// Expired rows are invisible to every operation and removed by
/// [`purge_expired`](Self::purge_expired).
#[derive(Clone)]
pub struct PgKeyValueStore {
    pool: PgPool,
}

impl PgKeyValueStore {
    /// Creates a new store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes expired rows, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE expires_at IS NOT NULL AND expires_at <= NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        reason: e.to_string(),
    }
}

#[async_trait]
impl KeyValueStore for PgKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar(
            r#"
            SELECT value FROM kv_entries
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(|ttl| ttl.as_secs_f64()))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn delete_if_exists(&self, key: &str) -> Result<bool, StoreError> {
        let live: Option<bool> = sqlx::query_scalar(
            r#"
            DELETE FROM kv_entries
            WHERE key = $1
            RETURNING (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(live.unwrap_or(false))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        // A single DELETE ... RETURNING: concurrent callers serialize on the
        // row lock and only one of them sees it.
        sqlx::query_scalar(
            r#"
            DELETE FROM kv_entries
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)
    }
}
