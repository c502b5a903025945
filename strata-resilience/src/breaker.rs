//! Circuit breaker guarding the text-generation capability.
//!
//! `Closed` trips to `Open` after `failure_threshold` consecutive failures.
//! `Open` becomes `HalfOpen` once the cooldown has elapsed, observed lazily by
//! the next call or state query. `HalfOpen` admits a single trial call whose
//! outcome either closes the circuit or re-opens it with a fresh cooldown.
//! A trial dropped before its outcome is recorded, e.g. a cancelled call,
//! gives its slot back.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use strata_core::config::CircuitBreakerConfig;
use strata_core::errors::GenerationError;
use strata_core::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change caused by recording an outcome. Callers turn these into
/// `circuit_opened` / `circuit_closed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerTransition {
    Unchanged,
    Opened { failures: u32 },
    Closed,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(self.config.cooldown_secs as i64)
    }

    /// Move `Open` to `HalfOpen` if the cooldown has elapsed.
    fn observe(&self, inner: &mut Inner) {
        if inner.state != BreakerState::Open {
            return;
        }
        let elapsed = match inner.opened_at {
            Some(at) => self.clock.now() - at,
            None => self.cooldown(),
        };
        if elapsed >= self.cooldown() {
            inner.state = BreakerState::HalfOpen;
            inner.trial_in_flight = false;
            info!(breaker = %self.name, "circuit half-open, admitting one trial call");
        }
    }

    /// Current state, applying the cooldown.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.observe(&mut inner);
        inner.state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask permission for one call. In `HalfOpen` only the first caller is
    /// admitted until its outcome is recorded or its admission dropped.
    pub fn admit(&self) -> Result<Admission<'_>, GenerationError> {
        let mut inner = self.lock();
        self.observe(&mut inner);
        match inner.state {
            BreakerState::Closed => Ok(Admission {
                breaker: self,
                trial: false,
            }),
            BreakerState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Ok(Admission {
                    breaker: self,
                    trial: true,
                })
            }
            BreakerState::HalfOpen => Err(GenerationError::CircuitOpen {
                failures: inner.consecutive_failures,
                retry_in_secs: 0,
            }),
            BreakerState::Open => {
                let remaining = inner
                    .opened_at
                    .map(|at| self.cooldown() - (self.clock.now() - at))
                    .unwrap_or_else(Duration::zero);
                Err(GenerationError::CircuitOpen {
                    failures: inner.consecutive_failures,
                    retry_in_secs: remaining.num_seconds().max(0) as u64,
                })
            }
        }
    }

    /// Give back an admitted trial that never reached the provider.
    pub fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    pub fn record_success(&self) -> BreakerTransition {
        let mut inner = self.lock();
        let was = inner.state;
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        if was == BreakerState::Closed {
            BreakerTransition::Unchanged
        } else {
            info!(breaker = %self.name, "circuit closed after successful trial");
            BreakerTransition::Closed
        }
    }

    pub fn record_failure(&self) -> BreakerTransition {
        let mut inner = self.lock();
        self.observe(&mut inner);
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let trip = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            BreakerState::Open => false,
        };
        if !trip {
            return BreakerTransition::Unchanged;
        }
        inner.state = BreakerState::Open;
        inner.opened_at = Some(self.clock.now());
        inner.trial_in_flight = false;
        warn!(
            breaker = %self.name,
            failures = inner.consecutive_failures,
            cooldown_secs = self.config.cooldown_secs,
            "circuit opened"
        );
        BreakerTransition::Opened {
            failures: inner.consecutive_failures,
        }
    }
}

/// Permission for one call. Settle it with the call's outcome; dropping it
/// unsettled frees the half-open trial slot.
#[must_use = "an admission must be settled with the call's outcome"]
pub struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
}

impl Admission<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) -> BreakerTransition {
        self.trial = false;
        self.breaker.record_success()
    }

    pub fn fail(mut self) -> BreakerTransition {
        self.trial = false;
        self.breaker.record_failure()
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.trial {
            debug!(breaker = %self.breaker.name, "trial call abandoned, slot released");
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ManualClock;

    fn breaker(threshold: u32, cooldown_secs: u64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_secs,
            },
            clock.clone(),
        );
        (cb, clock)
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let (cb, _) = breaker(5, 60);
        for _ in 0..4 {
            assert_eq!(cb.record_failure(), BreakerTransition::Unchanged);
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.record_failure(), BreakerTransition::Opened { failures: 5 });
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.admit().is_err());
    }

    #[test]
    fn success_resets_consecutive_count() {
        let (cb, _) = breaker(3, 60);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failure_count(), 2);
    }

    #[test]
    fn cooldown_moves_to_half_open() {
        let (cb, clock) = breaker(1, 60);
        cb.record_failure();
        clock.advance(Duration::seconds(59));
        assert_eq!(cb.state(), BreakerState::Open);
        clock.advance(Duration::seconds(1));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_admits_one_trial() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::seconds(10));
        let trial = cb.admit().unwrap();
        assert!(trial.is_trial());
        assert!(cb.admit().is_err());
        cb.release_trial();
        assert!(cb.admit().is_ok());
        drop(trial);
    }

    #[test]
    fn dropped_trial_frees_the_slot() {
        let (cb, clock) = breaker(1, 60);
        cb.record_failure();
        clock.advance(Duration::seconds(61));
        let trial = cb.admit().unwrap();
        drop(trial);

        clock.advance(Duration::seconds(3_600));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        let next = cb.admit().unwrap();
        assert_eq!(next.succeed(), BreakerTransition::Closed);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn closed_admissions_are_not_trials() {
        let (cb, _) = breaker(3, 60);
        let first = cb.admit().unwrap();
        let second = cb.admit().unwrap();
        assert!(!first.is_trial() && !second.is_trial());
        drop(first);
        assert_eq!(second.fail(), BreakerTransition::Unchanged);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn half_open_success_closes() {
        let (cb, clock) = breaker(2, 10);
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::seconds(11));
        let trial = cb.admit().unwrap();
        assert_eq!(trial.succeed(), BreakerTransition::Closed);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_cooldown() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::seconds(10));
        let trial = cb.admit().unwrap();
        assert!(matches!(trial.fail(), BreakerTransition::Opened { .. }));
        clock.advance(Duration::seconds(9));
        assert_eq!(cb.state(), BreakerState::Open);
        clock.advance(Duration::seconds(1));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn open_check_reports_remaining_cooldown() {
        let (cb, clock) = breaker(1, 60);
        cb.record_failure();
        clock.advance(Duration::seconds(20));
        match cb.admit() {
            Err(GenerationError::CircuitOpen { retry_in_secs, .. }) => assert_eq!(retry_in_secs, 40),
            Err(other) => panic!("expected CircuitOpen, got {other:?}"),
            Ok(_) => panic!("expected CircuitOpen, got an admission"),
        };
    }
}
