//! RecoveryAction enum: what a lifecycle cycle does when an operation fails.

use std::fmt;

use super::{
    ConsolidationError, EmbeddingError, GenerationError, LockError, StorageError, StrataError,
};

/// Recommended recovery action for a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Transient dependency failure. Retry on the next cycle.
    Retry,
    /// Continue on the degraded rule-based path.
    Fallback,
    /// Keep the record and revisit it later (repair queue, deferred batch).
    Defer,
    /// Cannot be handled by the pipeline. Surface to the operator.
    Escalate,
}

impl RecoveryAction {
    /// Determine the recommended recovery action for a StrataError.
    pub fn for_error(error: &StrataError) -> Self {
        match error {
            StrataError::StorageError(e) => match e {
                StorageError::Timeout { .. }
                | StorageError::WriteFailed { .. }
                | StorageError::ReadFailed { .. }
                | StorageError::Unavailable { .. } => Self::Retry,
            },

            StrataError::GenerationError(e) => match e {
                GenerationError::RateLimited { .. } => Self::Defer,
                GenerationError::CircuitOpen { .. }
                | GenerationError::Timeout { .. }
                | GenerationError::ProviderFailed { .. }
                | GenerationError::MalformedOutput { .. } => Self::Fallback,
            },

            StrataError::EmbeddingError(e) => match e {
                EmbeddingError::DimensionUnset
                | EmbeddingError::DimensionMismatch { .. }
                | EmbeddingError::NonFiniteValue => Self::Escalate,
                EmbeddingError::InferenceFailed { .. } | EmbeddingError::Timeout { .. } => {
                    Self::Defer
                }
            },

            StrataError::ConsolidationError(e) => match e {
                ConsolidationError::PartialWrite { .. } => Self::Defer,
                ConsolidationError::RepairExhausted { .. } => Self::Escalate,
                ConsolidationError::EmptyCluster => Self::Escalate,
            },

            StrataError::LockError(e) => match e {
                LockError::Contended { .. } => Self::Defer,
                LockError::NotHolder { .. } | LockError::Expired { .. } | LockError::Backend(_) => {
                    Self::Retry
                }
            },

            // Malformed structured output is a dependency failure, not data.
            StrataError::ValidationError(_) => Self::Fallback,

            StrataError::SerializationError(_) => Self::Escalate,
            StrataError::ConfigError(_) => Self::Escalate,
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "Retry"),
            Self::Fallback => write!(f, "Fallback"),
            Self::Defer => write!(f, "Defer"),
            Self::Escalate => write!(f, "Escalate"),
        }
    }
}
