//! SQLite key-value store implementation.
//!
//! Implements `KvStore` from `dealmemory-core` using sqlx with split
//! read/write pools. Values are stored verbatim as TEXT.

use chrono::Utc;
use dealmemory_core::storage::kv_store::KvStore;
use dealmemory_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite primary result code for "database or disk is full".
const SQLITE_FULL: &str = "13";

/// SQLite-backed implementation of `KvStore`.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: DatabasePool,
}

impl SqliteKvStore {
    /// Create a new KV store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a sqlx error, surfacing a full disk as a quota failure.
fn map_write_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(SQLITE_FULL) {
            return RepositoryError::QuotaExceeded(db_err.message().to_string());
        }
    }
    RepositoryError::Query(err.to_string())
}

fn map_read_error(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => RepositoryError::Connection,
        other => RepositoryError::Query(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// KvStore implementation
// ---------------------------------------------------------------------------

impl KvStore for SqliteKvStore {
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM memory_kv WHERE user_id = ? AND key = ?")
            .bind(user_id)
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_read_error)?;

        match row {
            Some(row) => {
                let value: String = row
                    .try_get("value")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, user_id: &str, key: &str, value: &str) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO memory_kv (user_id, key, value, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(user_id)
        .bind(key)
        .bind(value)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn delete(&self, user_id: &str, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM memory_kv WHERE user_id = ? AND key = ?")
            .bind(user_id)
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(map_write_error)?;

        Ok(())
    }

    async fn list_keys(&self, user_id: &str) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT key FROM memory_kv WHERE user_id = ? ORDER BY key")
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_read_error)?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: String = row
                .try_get("key")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            keys.push(key);
        }

        Ok(keys)
    }
}
