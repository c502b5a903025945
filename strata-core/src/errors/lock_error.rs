/// Distributed lock errors.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock {key} is held by {holder}")]
    Contended { key: String, holder: String },

    #[error("{holder} does not hold lock {key}")]
    NotHolder { key: String, holder: String },

    #[error("lease on {key} expired")]
    Expired { key: String },

    #[error("lock backend failed: {0}")]
    Backend(String),
}
