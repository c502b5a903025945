//! L2 → L3 consolidation configuration.

use serde::{Deserialize, Serialize};

use super::ensure_unit_interval;
use crate::errors::{StrataError, StrataResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub enabled: bool,
    pub cycle_interval_secs: u64,
    /// Width of the epoch-aligned time partitions.
    pub time_window_hours: u64,
    /// Facts whose cosine similarity exceeds this join the same cluster.
    pub similarity_threshold: f64,
    /// Smaller clusters wait for more facts.
    pub min_cluster_size: usize,
    /// Undersized clusters are forced through once their oldest fact is this old.
    pub max_fact_age_hours: u64,
    /// Upper bound on unconsolidated facts loaded per cycle.
    pub fact_scan_limit: usize,
    /// Repair attempts before a stuck episode is escalated (it stays queued).
    pub max_repair_attempts: u32,
    /// Consolidated facts older than this are evicted from L2.
    pub l2_ttl_hours: u64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_interval_secs: 300,
            time_window_hours: 24,
            similarity_threshold: 0.80,
            min_cluster_size: 2,
            max_fact_age_hours: 72,
            fact_scan_limit: 2_000,
            max_repair_attempts: 10,
            l2_ttl_hours: 168,
        }
    }
}

impl ConsolidationConfig {
    pub fn validate(&self) -> StrataResult<()> {
        ensure_unit_interval(
            "consolidation.similarity_threshold",
            self.similarity_threshold,
        )?;
        if self.time_window_hours == 0 {
            return Err(StrataError::ConfigError(
                "consolidation.time_window_hours must be >= 1".into(),
            ));
        }
        if self.min_cluster_size == 0 {
            return Err(StrataError::ConfigError(
                "consolidation.min_cluster_size must be >= 1".into(),
            ));
        }
        if self.cycle_interval_secs == 0 {
            return Err(StrataError::ConfigError(
                "consolidation.cycle_interval_secs must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
