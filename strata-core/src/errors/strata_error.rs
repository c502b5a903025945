use super::{ConsolidationError, EmbeddingError, GenerationError, LockError, StorageError};

/// Top-level error type for the Strata lifecycle.
/// All subsystem errors convert into this via `From` impls.
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("generation error: {0}")]
    GenerationError(#[from] GenerationError),

    #[error("embedding failed: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("consolidation error: {0}")]
    ConsolidationError(#[from] ConsolidationError),

    #[error("lock error: {0}")]
    LockError(#[from] LockError),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("config error: {0}")]
    ConfigError(String),
}

/// Convenience type alias.
pub type StrataResult<T> = Result<T, StrataError>;
