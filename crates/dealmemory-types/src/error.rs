use thiserror::Error;

/// Errors from key-value backend operations (used by the `KvStore` port in dealmemory-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors returned by a memory write.
///
/// Display texts are shown to end users as-is, so they say what to do next.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage limit exceeded ({size} of {limit} bytes). Please export and clear old data.")]
    SizeLimitExceeded { size: usize, limit: usize },

    #[error("Storage quota exceeded. Please clear old data or export your memory.")]
    QuotaExceeded,

    #[error("Failed to serialize memory: {0}")]
    Serialization(String),

    #[error("Failed to save memory to storage: {0}")]
    Backend(String),
}

/// Errors from decoding a collaborator's extraction response.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("extraction response is not a JSON object")]
    NotAnObject,
}

impl From<RepositoryError> for StoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::QuotaExceeded(_) => StoreError::QuotaExceeded,
            other => StoreError::Backend(other.to_string()),
        }
    }
}
