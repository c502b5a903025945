//! Background driver: one task per engine, each on its own interval.
//!
//! Engines never wait on each other. A slow or failing cycle in one engine
//! only delays that engine's next tick. Shutdown asks every engine to stop,
//! flips a `watch` channel, waits up to `shutdown_grace_secs` for in-flight
//! cycles, then shuts every engine down and checkpoints pending repairs.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use strata_consolidation::RepairCheckpoint;
use strata_core::errors::StrataResult;
use strata_core::traits::{CycleSummary, ILifecycleEngine};

use crate::health::{check_breaker, check_engine, check_repairs, HealthReport};
use crate::strata::Strata;

/// Last known outcome of an engine's cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    /// Summary of the last successful cycle.
    pub last: Option<CycleSummary>,
    /// Set when the most recent cycle failed; cleared by the next success.
    pub last_error: Option<String>,
    pub cycles: u64,
    pub failures: u64,
}

type StatusMap = Arc<DashMap<&'static str, EngineStatus>>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// Engines whose loop exited within the grace period.
    pub stopped: Vec<String>,
    /// Engines whose in-flight cycle was still running at the deadline.
    pub abandoned: Vec<String>,
    pub repair_checkpoint: RepairCheckpoint,
}

pub struct LifecycleRuntime {
    strata: Arc<Strata>,
    status: StatusMap,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl LifecycleRuntime {
    /// Spawn every engine loop. Must be called inside a tokio runtime.
    pub fn start(strata: Arc<Strata>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status: StatusMap = Arc::new(DashMap::new());
        let handles = strata
            .engines()
            .into_iter()
            .map(|engine| {
                let name = engine.name();
                let handle = tokio::spawn(drive(engine, status.clone(), shutdown_rx.clone()));
                (name, handle)
            })
            .collect::<Vec<_>>();
        info!(engines = handles.len(), "lifecycle runtime started");
        Self {
            strata,
            status,
            shutdown_tx,
            handles,
        }
    }

    pub fn strata(&self) -> &Arc<Strata> {
        &self.strata
    }

    pub fn status(&self, engine: &str) -> Option<EngineStatus> {
        self.status.get(engine).map(|s| s.value().clone())
    }

    pub fn health(&self) -> HealthReport {
        let mut checks = vec![
            check_breaker(self.strata.generator.breaker()),
            check_repairs(self.strata.consolidation.repairs()),
        ];
        for (name, _) in &self.handles {
            let status = self.status(name);
            checks.push(check_engine(name, status.as_ref()));
        }
        HealthReport::new(checks, self.strata.clock.now())
    }

    /// Stop new cycles, let in-flight ones wind down within the grace
    /// period, shut every engine down and checkpoint pending repairs.
    pub async fn shutdown(self) -> StrataResult<ShutdownReport> {
        let grace = Duration::from_secs(self.strata.config.runtime.shutdown_grace_secs);
        let deadline = Instant::now() + grace;
        for engine in self.strata.engines() {
            engine.request_stop();
        }
        // Receivers only go away when their loop has already exited.
        let _ = self.shutdown_tx.send(true);
        info!(grace_secs = grace.as_secs(), "lifecycle runtime shutting down");

        let mut report = ShutdownReport::default();
        for (name, mut handle) in self.handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.stopped.push(name.to_string()),
                Ok(Err(e)) => {
                    error!(engine = name, error = %e, "engine task ended abnormally");
                    report.stopped.push(name.to_string());
                }
                Err(_) => {
                    warn!(engine = name, "in-flight cycle exceeded the shutdown grace period, abandoning");
                    handle.abort();
                    report.abandoned.push(name.to_string());
                }
            }
        }

        for engine in self.strata.engines() {
            if let Err(e) = engine.shutdown().await {
                warn!(engine = engine.name(), error = %e, "engine shutdown reported an error");
            }
        }

        report.repair_checkpoint = self.strata.consolidation.checkpoint();
        info!(
            stopped = report.stopped.len(),
            abandoned = report.abandoned.len(),
            pending_repairs = report.repair_checkpoint.tasks.len(),
            "lifecycle runtime stopped"
        );
        Ok(report)
    }
}

async fn drive(engine: Arc<dyn ILifecycleEngine>, status: StatusMap, mut shutdown_rx: watch::Receiver<bool>) {
    let name = engine.name();
    let mut interval = tokio::time::interval(engine.cycle_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(engine = name, "engine loop exiting");
                    return;
                }
            }
            _ = interval.tick() => {
                let outcome = engine.tick().await;
                record(&status, name, outcome);
            }
        }
    }
}

fn record(status: &StatusMap, name: &'static str, outcome: StrataResult<CycleSummary>) {
    let mut entry = status.entry(name).or_default();
    entry.cycles += 1;
    match outcome {
        Ok(summary) => {
            entry.last = Some(summary);
            entry.last_error = None;
        }
        Err(e) => {
            error!(engine = name, error = %e, "lifecycle cycle failed");
            entry.failures += 1;
            entry.last_error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::errors::StrataError;

    #[test]
    fn failure_is_cleared_by_the_next_success() {
        let status: StatusMap = Arc::new(DashMap::new());
        record(&status, "promotion", Err(StrataError::ValidationError("bad batch".into())));
        assert_eq!(status.get("promotion").map(|s| s.failures), Some(1));
        assert!(status.get("promotion").and_then(|s| s.last_error.clone()).is_some());

        record(
            &status,
            "promotion",
            Ok(CycleSummary {
                engine: "promotion".into(),
                processed: 4,
                ..Default::default()
            }),
        );
        let entry = status.get("promotion").map(|s| s.value().clone()).unwrap();
        assert_eq!(entry.cycles, 2);
        assert_eq!(entry.failures, 1);
        assert!(entry.last_error.is_none());
        assert_eq!(entry.last.map(|s| s.processed), Some(4));
    }
}
