//! LlmProvider trait definition.
//!
//! The collaborator port: anything that can turn a `CompletionRequest` into
//! a reply. The chat service uses it for assistant replies and the
//! extractor for structured extraction. No transport lives in this crate.

use dealmemory_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for language-model backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name, used in log fields.
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
