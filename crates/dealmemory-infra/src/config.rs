//! Configuration loader for dealmemory.
//!
//! Reads `config.toml` from the data directory (`~/.dealmemory/` in
//! production) and deserializes it into [`DealMemoryConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use dealmemory_types::config::DealMemoryConfig;

/// Path of the config file inside `data_dir`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`DealMemoryConfig::default()`].
/// - Unreadable or unparsable file: logs a warning, returns the default.
/// - Otherwise the parsed config, with defaults for omitted keys.
pub async fn load_config(data_dir: &Path) -> DealMemoryConfig {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return DealMemoryConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return DealMemoryConfig::default();
        }
    };

    match toml::from_str::<DealMemoryConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            DealMemoryConfig::default()
        }
    }
}
