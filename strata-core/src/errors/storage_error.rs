/// Tier storage errors, as observed through the store contract.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{tier} {operation} timed out after {timeout_ms}ms")]
    Timeout {
        tier: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("{tier} write failed for {id}: {reason}")]
    WriteFailed {
        tier: String,
        id: String,
        reason: String,
    },

    #[error("{tier} read failed: {reason}")]
    ReadFailed { tier: String, reason: String },

    #[error("{tier} unavailable: {reason}")]
    Unavailable { tier: String, reason: String },
}
