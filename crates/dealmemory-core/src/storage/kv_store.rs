//! Key-value store trait.
//!
//! The persistence port behind `MemoryStore`. Values are opaque strings so
//! the store can measure, back up and restore the exact serialized blob.
//! Implementations: `InMemoryKvStore` (this crate) and `SqliteKvStore`
//! (dealmemory-infra).

use dealmemory_types::error::RepositoryError;

/// Trait for user-scoped key-value persistent storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns None if the key does not exist.
    fn get(
        &self,
        user_id: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Set a value for a key (upsert).
    ///
    /// Backends that enforce a size quota return `RepositoryError::QuotaExceeded`.
    fn set(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a key. No-op if key does not exist.
    fn delete(
        &self,
        user_id: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List all keys for a user, sorted.
    fn list_keys(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
