//! `MemoryStore`: durable read/modify/write access to one user's `Memory`.
//!
//! The document lives under a single key in a `KvStore`. Every write copies
//! the previous blob to a backup slot first, enforces a serialized size
//! limit (trimming old deal history when that is enough), and puts the
//! previous blob back if the backend rejects the new one.

use chrono::{DateTime, Utc};

use dealmemory_types::config::DealMemoryConfig;
use dealmemory_types::error::StoreError;
use dealmemory_types::memory::{
    DealOutcome, InvestmentThesis, MemoPreferences, Memory, MemorySummary, MemoryUpdate,
    RedFlagCandidate, RedFlagPatch,
};

use super::ops;
use crate::storage::kv_store::KvStore;

/// Key of the memory document.
pub const MEMORY_KEY: &str = "cowork_memory";

/// Key of the rolling pre-write copy of the memory document.
pub const BACKUP_KEY: &str = "cowork_memory_backup";

/// Key of the integer session counter.
pub const SESSION_KEY: &str = "cowork_session";

/// Message attached to a write that had to drop old deal history.
pub const TRIM_ADVISORY: &str =
    "Storage limit reached. Automatically removed old deal history to make space.";

/// Size limits applied on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Largest serialized document accepted, in bytes.
    pub max_bytes: usize,
    /// Deal-history entries kept when trimming an oversized document.
    pub history_keep: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_bytes: 4_000_000,
            history_keep: 10,
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport {
    pub updated_at: DateTime<Utc>,
    /// Size of the persisted document.
    pub bytes: usize,
    /// Deal-history entries dropped to fit the size limit.
    pub trimmed_deals: usize,
    /// Set when the write succeeded only after trimming.
    pub advisory: Option<String>,
}

/// Single source of truth for one user's memory.
pub struct MemoryStore<K: KvStore> {
    kv: K,
    user_id: String,
    limits: StoreLimits,
}

impl<K: KvStore> MemoryStore<K> {
    pub fn new(kv: K, user_id: impl Into<String>) -> Self {
        Self::with_limits(kv, user_id, StoreLimits::default())
    }

    pub fn with_limits(kv: K, user_id: impl Into<String>, limits: StoreLimits) -> Self {
        Self {
            kv,
            user_id: user_id.into(),
            limits,
        }
    }

    /// Build a store for `config.user_id` with the configured size limits.
    pub fn from_config(kv: K, config: &DealMemoryConfig) -> Self {
        Self::with_limits(
            kv,
            config.user_id.clone(),
            StoreLimits {
                max_bytes: config.max_storage_bytes,
                history_keep: config.history_keep,
            },
        )
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// The underlying key-value backend.
    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Current memory, or an empty one if nothing usable is stored.
    ///
    /// Missing, corrupt and unreadable documents are all treated as absent.
    /// Inside a readable document, entries that cannot be decoded or repaired
    /// are dropped one by one; the rest of the profile survives.
    pub async fn read(&self) -> Memory {
        let blob = match self.kv.get(&self.user_id, MEMORY_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return Memory::new(&self.user_id),
            Err(e) => {
                tracing::error!(user_id = %self.user_id, error = %e, "Failed to read memory; using empty memory");
                return Memory::new(&self.user_id);
            }
        };

        match serde_json::from_str::<Memory>(&blob) {
            Ok(mut memory) => {
                let repaired = ops::repair(&mut memory);
                if repaired > 0 {
                    tracing::warn!(
                        user_id = %self.user_id,
                        repaired,
                        "Repaired malformed entries in stored memory"
                    );
                }
                memory
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    error = %e,
                    bytes = blob.len(),
                    "Stored memory is corrupt; using empty memory"
                );
                Memory::new(&self.user_id)
            }
        }
    }

    /// Stamp `updated_at`, enforce the size limit and persist.
    ///
    /// The caller's value is not modified; trimming applies to the persisted
    /// copy only. On any error the previously stored document is still the
    /// current one.
    #[tracing::instrument(name = "write_memory", skip(self, memory), fields(user_id = %self.user_id))]
    pub async fn write(&self, memory: &Memory) -> Result<WriteReport, StoreError> {
        let mut updated = memory.clone();
        updated.updated_at = Utc::now();

        let mut json = serialize(&updated)?;
        let mut trimmed_deals = 0;

        if json.len() > self.limits.max_bytes {
            tracing::warn!(
                bytes = json.len(),
                limit = self.limits.max_bytes,
                "Memory exceeds storage limit"
            );

            if updated.deal_history.len() > self.limits.history_keep {
                trimmed_deals = updated.deal_history.len() - self.limits.history_keep;
                updated.deal_history.drain(..trimmed_deals);
                json = serialize(&updated)?;
                tracing::warn!(
                    trimmed_deals,
                    bytes = json.len(),
                    "Removed oldest deal history entries"
                );
            }

            if json.len() > self.limits.max_bytes {
                return Err(StoreError::SizeLimitExceeded {
                    size: json.len(),
                    limit: self.limits.max_bytes,
                });
            }
        }

        let previous = match self.kv.get(&self.user_id, MEMORY_KEY).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read current memory for backup");
                None
            }
        };
        if let Some(ref blob) = previous {
            if let Err(e) = self.kv.set(&self.user_id, BACKUP_KEY, blob).await {
                tracing::warn!(error = %e, "Failed to back up memory; continuing with write");
            }
        }

        if let Err(e) = self.kv.set(&self.user_id, MEMORY_KEY, &json).await {
            tracing::error!(error = %e, bytes = json.len(), "Failed to persist memory");
            self.restore(previous.as_deref()).await;
            return Err(e.into());
        }

        tracing::debug!(bytes = json.len(), "Memory persisted");
        Ok(WriteReport {
            updated_at: updated.updated_at,
            bytes: json.len(),
            trimmed_deals,
            advisory: (trimmed_deals > 0).then(|| TRIM_ADVISORY.to_string()),
        })
    }

    /// Put the pre-write document back after a failed write.
    async fn restore(&self, previous: Option<&str>) {
        let result = match previous {
            Some(blob) => self.kv.set(&self.user_id, MEMORY_KEY, blob).await,
            None => self.kv.delete(&self.user_id, MEMORY_KEY).await,
        };
        match result {
            Ok(()) => tracing::info!("Restored memory from backup"),
            Err(e) => tracing::error!(error = %e, "Failed to restore memory from backup"),
        }
    }

    /// Read, apply `f`, and write once if `f` reports a change.
    async fn modify<F>(&self, f: F) -> Result<Option<MemoryUpdate>, StoreError>
    where
        F: FnOnce(&mut Memory) -> Option<MemoryUpdate> + Send,
    {
        let mut memory = self.read().await;
        let update = f(&mut memory);
        if update.is_some() {
            self.write(&memory).await?;
        }
        Ok(update)
    }

    /// Add a red flag, or reinforce the one with the same pattern.
    pub async fn add_red_flag(&self, candidate: RedFlagCandidate) -> Result<MemoryUpdate, StoreError> {
        let mut memory = self.read().await;
        let update = ops::add_red_flag(&mut memory, candidate);
        self.write(&memory).await?;
        Ok(update)
    }

    /// Delete a red flag. `Ok(None)` if the id is unknown.
    pub async fn remove_red_flag(&self, id: &str) -> Result<Option<MemoryUpdate>, StoreError> {
        self.modify(|memory| ops::remove_red_flag(memory, id)).await
    }

    /// Edit a red flag. `Ok(None)` if the id is unknown.
    pub async fn update_red_flag(
        &self,
        id: &str,
        patch: RedFlagPatch,
    ) -> Result<Option<MemoryUpdate>, StoreError> {
        self.modify(|memory| ops::update_red_flag(memory, id, patch)).await
    }

    /// Insert or replace the deal-history entry for `outcome.company`.
    pub async fn add_deal_outcome(&self, outcome: DealOutcome) -> Result<MemoryUpdate, StoreError> {
        let mut memory = self.read().await;
        let update = ops::upsert_deal_outcome(&mut memory, outcome);
        self.write(&memory).await?;
        Ok(update)
    }

    pub async fn set_investment_thesis(
        &self,
        thesis: Option<InvestmentThesis>,
    ) -> Result<MemoryUpdate, StoreError> {
        let mut memory = self.read().await;
        let update = ops::set_investment_thesis(&mut memory, thesis);
        self.write(&memory).await?;
        Ok(update)
    }

    pub async fn set_memo_preferences(
        &self,
        prefs: Option<MemoPreferences>,
    ) -> Result<MemoryUpdate, StoreError> {
        let mut memory = self.read().await;
        let update = ops::set_memo_preferences(&mut memory, prefs);
        self.write(&memory).await?;
        Ok(update)
    }

    /// Append free-form context. `Ok(None)` if it is empty or already stored.
    pub async fn add_raw_context(&self, context: &str) -> Result<Option<MemoryUpdate>, StoreError> {
        self.modify(|memory| ops::add_raw_context(memory, context)).await
    }

    /// Replace the stored memory with a fresh empty one and return it.
    pub async fn reset(&self) -> Result<Memory, StoreError> {
        let fresh = Memory::new(&self.user_id);
        let report = self.write(&fresh).await?;
        tracing::info!(user_id = %self.user_id, "Memory reset");
        Ok(Memory {
            updated_at: report.updated_at,
            ..fresh
        })
    }

    /// Reset the memory and the session counter.
    pub async fn full_reset(&self) -> Result<Memory, StoreError> {
        let fresh = self.reset().await?;
        self.reset_session_count().await?;
        Ok(fresh)
    }

    pub async fn memory_summary(&self) -> MemorySummary {
        MemorySummary::from(&self.read().await)
    }

    // -----------------------------------------------------------------------
    // Session counter
    // -----------------------------------------------------------------------

    /// Current session number. Missing or unparsable counters read as 1.
    pub async fn session_count(&self) -> u64 {
        match self.kv.get(&self.user_id, SESSION_KEY).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or(1),
            Ok(None) => 1,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session counter");
                1
            }
        }
    }

    /// Advance to the next session and return its number.
    pub async fn increment_session(&self) -> Result<u64, StoreError> {
        let next = self.session_count().await.saturating_add(1);
        self.kv
            .set(&self.user_id, SESSION_KEY, &next.to_string())
            .await?;
        Ok(next)
    }

    pub async fn reset_session_count(&self) -> Result<(), StoreError> {
        self.kv.set(&self.user_id, SESSION_KEY, "1").await?;
        Ok(())
    }
}

fn serialize(memory: &Memory) -> Result<String, StoreError> {
    serde_json::to_string(memory).map_err(|e| StoreError::Serialization(e.to_string()))
}
