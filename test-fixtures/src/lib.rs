//! Shared test fixtures for the Strata workspace.
//!
//! In-memory implementations of every collaborator contract, with failure
//! injection where a test needs to break one:
//! - [`InMemoryTierStore`] and [`GraphEpisodeStore`] for tier storage
//! - [`MockGenerator`] with scripted or computed responses per task
//! - [`DeterministicEmbedder`] bag-of-words embeddings
//! - [`InMemoryLock`] lease lock driven by an injected clock
//! - [`RecordingSink`] capturing lifecycle events
//! - builders in [`builders`]

pub mod builders;
pub mod embedder;
pub mod generator;
pub mod graph_store;
pub mod lock;
pub mod store;
pub mod telemetry;

pub use embedder::DeterministicEmbedder;
pub use generator::MockGenerator;
pub use graph_store::GraphEpisodeStore;
pub use lock::InMemoryLock;
pub use store::InMemoryTierStore;
pub use telemetry::RecordingSink;
