//! L1 → L2 promotion configuration.

use serde::{Deserialize, Serialize};

use super::ensure_unit_interval;
use crate::errors::{StrataError, StrataResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub enabled: bool,
    /// Turns per batch; a full batch triggers promotion immediately.
    pub batch_size: usize,
    /// A partial batch is promoted once its oldest turn is this old.
    pub max_batch_wait_secs: u64,
    pub cycle_interval_secs: u64,
    /// Upper bound on unprocessed turns scanned to discover sessions.
    pub session_scan_limit: usize,
    /// Batches drained per session per cycle.
    pub max_batches_per_session: usize,
    /// Processed turns older than this are evicted from L1.
    pub l1_ttl_hours: u64,
    /// Certainty assigned to rule-based fallback facts.
    pub fallback_certainty: f64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 10,
            max_batch_wait_secs: 300,
            cycle_interval_secs: 30,
            session_scan_limit: 1_000,
            max_batches_per_session: 10,
            l1_ttl_hours: 24,
            fallback_certainty: 0.75,
        }
    }
}

impl PromotionConfig {
    pub fn validate(&self) -> StrataResult<()> {
        if self.batch_size == 0 {
            return Err(StrataError::ConfigError(
                "promotion.batch_size must be >= 1".into(),
            ));
        }
        if self.cycle_interval_secs == 0 {
            return Err(StrataError::ConfigError(
                "promotion.cycle_interval_secs must be >= 1".into(),
            ));
        }
        if self.max_batches_per_session == 0 {
            return Err(StrataError::ConfigError(
                "promotion.max_batches_per_session must be >= 1".into(),
            ));
        }
        ensure_unit_interval("promotion.fallback_certainty", self.fallback_certainty)
    }
}
