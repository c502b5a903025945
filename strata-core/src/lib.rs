//! # strata-core
//!
//! Shared foundation for the Strata tiered memory lifecycle.
//!
//! ## Modules
//! - `clock`: injectable time source (system + manual)
//! - `config`: StrataConfig and per-subsystem sections, TOML loading, validation
//! - `errors`: StrataError tree, RecoveryAction, ErrorChain
//! - `filter`: backend-neutral record filters and sort orders
//! - `models`: TurnRecord (L1), Fact (L2), Episode (L3), KnowledgeDocument (L4),
//!   SynthesisResult, lifecycle events, generation requests
//! - `store`: timeout-guarded wrapper over a tier store
//! - `traits`: collaborator contracts (tier stores, generation, embedding, lock,
//!   telemetry, lifecycle engine)
//! - `vector`: cosine similarity and dimension validation

pub mod clock;
pub mod config;
pub mod errors;
pub mod filter;
pub mod models;
pub mod store;
pub mod traits;
pub mod vector;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StrataConfig;
pub use errors::{StrataError, StrataResult};
pub use filter::{FilterOp, RecordFilter, SortOrder};
pub use store::TimedTierStore;
