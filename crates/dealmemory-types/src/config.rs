//! Configuration types for dealmemory.
//!
//! `DealMemoryConfig` represents the top-level `config.toml` that controls
//! whose memory is loaded, how large it may grow, and the request limits used
//! when talking to the language-model collaborator.

use serde::{Deserialize, Serialize};

use crate::memory::DEFAULT_USER_ID;

/// Top-level configuration.
///
/// Loaded from `~/.dealmemory/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealMemoryConfig {
    /// Whose memory document to open.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Serialized size limit for one memory document, in bytes.
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: usize,

    /// Deal-history entries kept when an oversized document is trimmed.
    #[serde(default = "default_history_keep")]
    pub history_keep: usize,

    /// Conversations shorter than this are not sent for extraction.
    #[serde(default = "default_min_messages_for_extraction")]
    pub min_messages_for_extraction: usize,

    /// Output token limit for assistant replies.
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,

    /// Output token limit for extraction calls.
    #[serde(default = "default_extract_max_tokens")]
    pub extract_max_tokens: u32,

    /// Model for assistant replies. Empty means the provider default.
    #[serde(default)]
    pub chat_model: String,

    /// Model for extraction calls. Empty means the provider default.
    #[serde(default)]
    pub extract_model: String,
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_max_storage_bytes() -> usize {
    4_000_000
}

fn default_history_keep() -> usize {
    10
}

fn default_min_messages_for_extraction() -> usize {
    2
}

fn default_chat_max_tokens() -> u32 {
    2048
}

fn default_extract_max_tokens() -> u32 {
    4096
}

impl Default for DealMemoryConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            max_storage_bytes: default_max_storage_bytes(),
            history_keep: default_history_keep(),
            min_messages_for_extraction: default_min_messages_for_extraction(),
            chat_max_tokens: default_chat_max_tokens(),
            extract_max_tokens: default_extract_max_tokens(),
            chat_model: String::new(),
            extract_model: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = DealMemoryConfig::default();
        assert_eq!(config.user_id, "demo_user");
        assert_eq!(config.max_storage_bytes, 4_000_000);
        assert_eq!(config.history_keep, 10);
        assert_eq!(config.min_messages_for_extraction, 2);
        assert_eq!(config.chat_max_tokens, 2048);
        assert_eq!(config.extract_max_tokens, 4096);
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: DealMemoryConfig = toml::from_str("").unwrap();
        assert_eq!(config, DealMemoryConfig::default());
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
user_id = "partner_7"
max_storage_bytes = 1000000
history_keep = 5
extract_model = "claude-opus-4"
"#;
        let config: DealMemoryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.user_id, "partner_7");
        assert_eq!(config.max_storage_bytes, 1_000_000);
        assert_eq!(config.history_keep, 5);
        assert_eq!(config.extract_model, "claude-opus-4");
        assert_eq!(config.chat_max_tokens, 2048);
    }
}
