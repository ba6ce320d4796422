//! Data-directory layout for dealmemory.
//!
//! Everything persistent lives in one directory: `config.toml` and the
//! SQLite database.

use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "DEALMEMORY_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `DEALMEMORY_DATA_DIR` environment variable
/// 2. `~/.dealmemory`
/// 3. `.dealmemory` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".dealmemory");
    }

    PathBuf::from(".dealmemory")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}
