//! CIAR significance scoring configuration.

use serde::{Deserialize, Serialize};

use super::{ensure_positive, ensure_unit_interval};
use crate::errors::StrataResult;

/// Shape of the age discount applied to certainty × impact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecayFunction {
    /// Halves every `half_life_hours`.
    Exponential { half_life_hours: f64 },
    /// Falls linearly to zero at `horizon_hours`.
    Linear { horizon_hours: f64 },
    /// No age discount.
    None,
}

impl Default for DecayFunction {
    fn default() -> Self {
        Self::Exponential {
            half_life_hours: 168.0,
        }
    }
}

/// Configuration for the CIAR scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CiarConfig {
    /// Facts scoring at or above this are promoted.
    pub threshold: f64,
    /// Age discount shape.
    pub decay: DecayFunction,
    /// Maximum multiplicative boost for a just-referenced fact.
    pub recency_weight: f64,
    /// Hours for the recency boost to halve.
    pub recency_half_life_hours: f64,
}

impl Default for CiarConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            decay: DecayFunction::default(),
            recency_weight: 0.2,
            recency_half_life_hours: 24.0,
        }
    }
}

impl CiarConfig {
    pub fn validate(&self) -> StrataResult<()> {
        ensure_unit_interval("ciar.threshold", self.threshold)?;
        if self.recency_weight < 0.0 || !self.recency_weight.is_finite() {
            return Err(crate::errors::StrataError::ConfigError(format!(
                "ciar.recency_weight must be >= 0, got {}",
                self.recency_weight
            )));
        }
        ensure_positive("ciar.recency_half_life_hours", self.recency_half_life_hours)?;
        match self.decay {
            DecayFunction::Exponential { half_life_hours } => {
                ensure_positive("ciar.decay.half_life_hours", half_life_hours)
            }
            DecayFunction::Linear { horizon_hours } => {
                ensure_positive("ciar.decay.horizon_hours", horizon_hours)
            }
            DecayFunction::None => Ok(()),
        }
    }
}
