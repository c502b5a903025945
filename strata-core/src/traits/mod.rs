//! Collaborator contracts. The lifecycle depends only on these, never on a
//! concrete backend.

mod embedding;
mod engine;
mod generation;
mod lock;
mod telemetry;
mod tier_store;

pub use embedding::IEmbeddingProvider;
pub use engine::{CycleSummary, ILifecycleEngine};
pub use generation::IGenerationProvider;
pub use lock::{IDistributedLock, LockLease};
pub use telemetry::{ITelemetrySink, TracingTelemetry};
pub use tier_store::{ITierStore, TierRecord};
