//! Query-time knowledge synthesis configuration.

use serde::{Deserialize, Serialize};

use super::ensure_unit_interval;
use crate::errors::{StrataError, StrataResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Documents at or above this cosine similarity are grouped as near-duplicates.
    pub similarity_threshold: f64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: u64,
    /// Latency target for the metadata filter stage.
    pub filter_latency_budget_ms: u64,
    /// Upper bound on documents returned by the metadata filter.
    pub max_candidates: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            cache_ttl_secs: 3_600,
            cache_max_entries: 1_024,
            filter_latency_budget_ms: 200,
            max_candidates: 200,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> StrataResult<()> {
        ensure_unit_interval("synthesis.similarity_threshold", self.similarity_threshold)?;
        if self.max_candidates == 0 {
            return Err(StrataError::ConfigError(
                "synthesis.max_candidates must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
