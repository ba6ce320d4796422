//! In-process key-value store.
//!
//! `InMemoryKvStore` keeps entries in a `DashMap` keyed by `(user_id, key)`.
//! An optional per-user byte quota mimics browser-style storage limits so the
//! memory store's quota recovery path can be exercised without a real disk.

use dashmap::DashMap;
use dealmemory_types::error::RepositoryError;

use super::kv_store::KvStore;

/// Non-durable `KvStore` backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: DashMap<(String, String), String>,
    quota_bytes: Option<usize>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total bytes (keys + values) one user may hold.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes held by `user_id`, not counting `excluding_key`.
    fn used_bytes(&self, user_id: &str, excluding_key: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key().0 == user_id && e.key().1 != excluding_key)
            .map(|e| e.key().1.len() + e.value().len())
            .sum()
    }
}

impl KvStore for InMemoryKvStore {
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .entries
            .get(&(user_id.to_string(), key.to_string()))
            .map(|v| v.value().clone()))
    }

    async fn set(&self, user_id: &str, key: &str, value: &str) -> Result<(), RepositoryError> {
        if let Some(quota) = self.quota_bytes {
            let needed = self.used_bytes(user_id, key) + key.len() + value.len();
            if needed > quota {
                return Err(RepositoryError::QuotaExceeded(format!(
                    "{needed} bytes requested, quota is {quota}"
                )));
            }
        }

        self.entries
            .insert((user_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn delete(&self, user_id: &str, key: &str) -> Result<(), RepositoryError> {
        self.entries.remove(&(user_id.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_keys(&self, user_id: &str) -> Result<Vec<String>, RepositoryError> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == user_id)
            .map(|e| e.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
