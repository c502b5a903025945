use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::StrataResult;

/// Engine-agnostic outcome of one cycle, for the runtime and health reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub engine: String,
    /// Records read and worked on.
    pub processed: usize,
    /// Records written to the next tier.
    pub written: usize,
    /// Records left for a later cycle.
    pub deferred: usize,
    pub errors: usize,
    pub duration_ms: u64,
    /// The cycle did nothing because the engine is disabled or shutting down.
    pub skipped: bool,
}

/// A background lifecycle engine driven by the runtime.
#[async_trait]
pub trait ILifecycleEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn cycle_interval(&self) -> Duration;

    /// Run one cycle.
    async fn tick(&self) -> StrataResult<CycleSummary>;

    /// Ask an in-flight cycle to stop after its current unit of work. Later
    /// cycles are skipped.
    fn request_stop(&self);

    /// Stop accepting new work, wait for the in-flight cycle, checkpoint and
    /// release held resources.
    async fn shutdown(&self) -> StrataResult<()>;
}
