//! # strata-runtime
//!
//! Assembly and background driving of the memory lifecycle.
//!
//! [`Strata::assemble`] validates configuration, checks that every store
//! answers, and wires the promotion,
//! consolidation and distillation engines plus the knowledge synthesizer
//! around one shared resilient generator. [`LifecycleRuntime`] runs each
//! engine on its own interval and handles graceful shutdown.

pub mod health;
pub mod runtime;
pub mod strata;
pub mod telemetry;

pub use health::{HealthReport, SubsystemCheck};
pub use runtime::{EngineStatus, LifecycleRuntime, ShutdownReport};
pub use strata::{Collaborators, Strata, StrataStores};
pub use telemetry::init_tracing;
