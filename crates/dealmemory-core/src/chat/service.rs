//! Chat service wiring memory into the conversation loop.
//!
//! `MemoryChatService` coordinates the `MemoryStore` and an `LlmProvider`:
//! each reply is generated with the rendered memory in the system prompt,
//! and `learn` feeds the finished exchange back through extraction.

use dealmemory_types::config::DealMemoryConfig;
use dealmemory_types::llm::{CompletionRequest, LlmError, Message, MessageRole, Usage};
use dealmemory_types::memory::MemoryUpdate;
use tracing::{debug, info};

use crate::llm::provider::LlmProvider;
use crate::memory::extractor::{SessionMemoryExtractor, quick_extract};
use crate::memory::injector::{build_system_prompt, render};
use crate::memory::store::MemoryStore;
use crate::storage::kv_store::KvStore;

/// Base instructions for the assistant, before memory is appended.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an analyst assistant for a venture investor. \
You help evaluate deals, flag concerns and draft investment memos.

Key behaviors:
- Be direct and analytical; investment decisions need clarity
- Check every new deal against the investor's known red flags and thesis
- Refer to past deals when they are relevant
- Follow the investor's memo preferences without being asked

Use what you remember the way a colleague would, without announcing that you remember it.";

/// An assistant reply plus the tentative signals spotted in the exchange.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub usage: Usage,
    /// Advisory output of `quick_extract`; nothing here has been stored.
    pub signals: Vec<MemoryUpdate>,
}

/// Generates memory-aware replies and learns from finished conversations.
///
/// Generic over `LlmProvider` and `KvStore` so the core never depends on a
/// concrete transport or database.
pub struct MemoryChatService<P: LlmProvider, K: KvStore> {
    provider: P,
    store: MemoryStore<K>,
    config: DealMemoryConfig,
    system_prompt: String,
}

impl<P: LlmProvider, K: KvStore> MemoryChatService<P, K> {
    pub fn new(provider: P, store: MemoryStore<K>, config: DealMemoryConfig) -> Self {
        Self {
            provider,
            store,
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the base system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn store(&self) -> &MemoryStore<K> {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The full system prompt that the next reply would be generated with.
    pub async fn system_prompt(&self, deal_context: Option<&str>) -> String {
        let memory = self.store.read().await;
        build_system_prompt(&self.system_prompt, &render(&memory), deal_context)
    }

    /// Generate the assistant's next reply to `messages`.
    #[tracing::instrument(
        name = "chat_respond",
        skip(self, messages, deal_context),
        fields(
            provider = self.provider.name(),
            user_id = %self.store.user_id(),
            message_count = messages.len(),
        )
    )]
    pub async fn respond(
        &self,
        messages: &[Message],
        deal_context: Option<&str>,
    ) -> Result<ChatReply, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::InvalidRequest(
                "conversation has no messages".to_string(),
            ));
        }

        let request = CompletionRequest {
            model: self.config.chat_model.clone(),
            messages: messages.to_vec(),
            system: Some(self.system_prompt(deal_context).await),
            max_tokens: self.config.chat_max_tokens,
            temperature: None,
        };

        let response = self.provider.complete(&request).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Chat response received"
        );

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let signals = quick_extract(last_user, &response.content);

        Ok(ChatReply {
            content: response.content,
            usage: response.usage,
            signals,
        })
    }

    /// Run extraction over a conversation and persist what it teaches.
    pub async fn learn(&self, messages: &[Message]) -> Result<Vec<MemoryUpdate>, LlmError> {
        let updates =
            SessionMemoryExtractor::extract(&self.provider, &self.store, messages, &self.config)
                .await?;
        if !updates.is_empty() {
            info!(updates = updates.len(), "Learned from conversation");
        }
        Ok(updates)
    }
}
