mod chain;
mod consolidation_error;
mod embedding_error;
mod generation_error;
mod lock_error;
mod recovery;
mod storage_error;
mod strata_error;

pub use chain::{ChainedError, ErrorChain};
pub use consolidation_error::ConsolidationError;
pub use embedding_error::EmbeddingError;
pub use generation_error::GenerationError;
pub use lock_error::LockError;
pub use recovery::RecoveryAction;
pub use storage_error::StorageError;
pub use strata_error::{StrataError, StrataResult};
