//! Health checks over the assembled subsystems.

use chrono::{DateTime, Utc};
use serde::Serialize;

use strata_consolidation::RepairQueue;
use strata_resilience::{BreakerState, CircuitBreaker};

use crate::runtime::EngineStatus;

/// Result of a single subsystem check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemCheck {
    pub name: String,
    pub healthy: bool,
    /// Reason when unhealthy, otherwise a short status line.
    pub detail: String,
}

impl SubsystemCheck {
    pub fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn unhealthy(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checks: Vec<SubsystemCheck>,
    /// True when every check passed.
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(checks: Vec<SubsystemCheck>, checked_at: DateTime<Utc>) -> Self {
        let healthy = checks.iter().all(|c| c.healthy);
        Self {
            checks,
            healthy,
            checked_at,
        }
    }

    pub fn check(&self, name: &str) -> Option<&SubsystemCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// An open breaker means every generation call is degraded to fallbacks.
pub fn check_breaker(breaker: &CircuitBreaker) -> SubsystemCheck {
    let state = breaker.state();
    let detail = format!("{} ({} consecutive failures)", state.as_str(), breaker.failure_count());
    match state {
        BreakerState::Open => SubsystemCheck::unhealthy("generation_breaker", detail),
        BreakerState::Closed | BreakerState::HalfOpen => SubsystemCheck::ok("generation_breaker", detail),
    }
}

pub fn check_repairs(repairs: &RepairQueue) -> SubsystemCheck {
    let exhausted = repairs.exhausted();
    if exhausted > 0 {
        return SubsystemCheck::unhealthy(
            "repair_queue",
            format!("{exhausted} of {} repairs exhausted their attempts", repairs.len()),
        );
    }
    SubsystemCheck::ok("repair_queue", format!("{} pending", repairs.len()))
}

pub fn check_engine(name: &str, status: Option<&EngineStatus>) -> SubsystemCheck {
    let Some(status) = status else {
        return SubsystemCheck::ok(name, "not run yet");
    };
    if let Some(error) = &status.last_error {
        return SubsystemCheck::unhealthy(name, format!("last cycle failed: {error}"));
    }
    match &status.last {
        Some(summary) if summary.skipped => SubsystemCheck::ok(name, "last cycle skipped"),
        Some(summary) => SubsystemCheck::ok(
            name,
            format!(
                "{} cycles, last processed {} wrote {} in {}ms",
                status.cycles, summary.processed, summary.written, summary.duration_ms
            ),
        ),
        None => SubsystemCheck::ok(name, "not run yet"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::traits::CycleSummary;

    #[test]
    fn report_is_healthy_only_when_every_check_passes() {
        let now = Utc::now();
        assert!(HealthReport::new(vec![SubsystemCheck::ok("a", "fine")], now).healthy);
        let report = HealthReport::new(
            vec![SubsystemCheck::ok("a", "fine"), SubsystemCheck::unhealthy("b", "down")],
            now,
        );
        assert!(!report.healthy);
        assert_eq!(report.check("b").map(|c| c.detail.as_str()), Some("down"));
    }

    #[test]
    fn failed_cycle_marks_engine_unhealthy() {
        let status = EngineStatus {
            last: None,
            last_error: Some("storage timeout".into()),
            cycles: 3,
            failures: 1,
        };
        let check = check_engine("promotion", Some(&status));
        assert!(!check.healthy);
        assert!(check.detail.contains("storage timeout"));
    }

    #[test]
    fn engine_without_cycles_is_healthy() {
        assert!(check_engine("distillation", None).healthy);
        let status = EngineStatus {
            last: Some(CycleSummary {
                engine: "distillation".into(),
                processed: 5,
                written: 2,
                ..Default::default()
            }),
            last_error: None,
            cycles: 1,
            failures: 0,
        };
        assert!(check_engine("distillation", Some(&status)).detail.contains("wrote 2"));
    }

    #[test]
    fn empty_repair_queue_is_healthy() {
        let check = check_repairs(&RepairQueue::new(3));
        assert!(check.healthy);
        assert_eq!(check.detail, "0 pending");
    }
}
