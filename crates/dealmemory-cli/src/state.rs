//! Application state shared by every command.
//!
//! Resolves the data directory, loads `config.toml`, opens the SQLite
//! database and builds the `MemoryStore` for the configured user.

use std::path::PathBuf;

use anyhow::Context;

use dealmemory_core::memory::store::MemoryStore;
use dealmemory_infra::config::load_config;
use dealmemory_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use dealmemory_infra::sqlite::kv::SqliteKvStore;
use dealmemory_infra::sqlite::pool::{DatabasePool, database_url};
use dealmemory_types::config::DealMemoryConfig;

pub struct AppState {
    pub store: MemoryStore<SqliteKvStore>,
    pub config: DealMemoryConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the memory store. `user` overrides the configured user id.
    pub async fn init(user: Option<String>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let mut config = load_config(&data_dir).await;
        if let Some(user) = user {
            config.user_id = user;
        }

        let url = format!("{}?mode=rwc", database_url(&data_dir));
        let pool = DatabasePool::new(&url)
            .await
            .with_context(|| format!("Failed to open database in {}", data_dir.display()))?;

        let store = MemoryStore::from_config(SqliteKvStore::new(pool), &config);
        tracing::debug!(user_id = %config.user_id, data_dir = %data_dir.display(), "App state ready");

        Ok(Self {
            store,
            config,
            data_dir,
        })
    }
}
