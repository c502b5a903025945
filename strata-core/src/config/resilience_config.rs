//! Circuit breaker, rate limiting and timeout configuration.

use serde::{Deserialize, Serialize};

use crate::errors::{StrataError, StrataResult};

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before admitting a trial call.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

/// Proactive pacing budgets for the generation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
    /// Longest a caller will be paced before the request is rejected.
    pub max_wait_ms: u64,
    /// Extra delay added on top of the computed wait.
    pub backoff_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            tokens_per_minute: 90_000,
            max_wait_ms: 30_000,
            backoff_ms: 250,
        }
    }
}

/// Timeouts for every external call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub generation_ms: u64,
    pub storage_ms: u64,
    pub embedding_ms: u64,
    pub lock_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generation_ms: 30_000,
            storage_ms: 5_000,
            embedding_ms: 10_000,
            lock_ms: 2_000,
        }
    }
}

/// Resilience fabric configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub timeouts: TimeoutConfig,
}

impl ResilienceConfig {
    pub fn validate(&self) -> StrataResult<()> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(StrataError::ConfigError(
                "resilience.circuit_breaker.failure_threshold must be >= 1".into(),
            ));
        }
        if self.rate_limit.requests_per_minute == 0 || self.rate_limit.tokens_per_minute == 0 {
            return Err(StrataError::ConfigError(
                "resilience.rate_limit budgets must be >= 1".into(),
            ));
        }
        let t = &self.timeouts;
        if t.generation_ms == 0 || t.storage_ms == 0 || t.embedding_ms == 0 || t.lock_ms == 0 {
            return Err(StrataError::ConfigError(
                "resilience.timeouts must all be > 0; no external call may block indefinitely"
                    .into(),
            ));
        }
        Ok(())
    }
}
