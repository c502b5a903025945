pub mod ciar_config;
pub mod consolidation_config;
pub mod distillation_config;
pub mod domain_schema;
pub mod embedding_config;
pub mod lock_config;
pub mod promotion_config;
pub mod resilience_config;
pub mod runtime_config;
pub mod synthesis_config;

use serde::{Deserialize, Serialize};

use crate::errors::{StrataError, StrataResult};

pub use ciar_config::{CiarConfig, DecayFunction};
pub use consolidation_config::ConsolidationConfig;
pub use distillation_config::DistillationConfig;
pub use domain_schema::{DomainSchema, MetadataFieldSpec, MetadataKind};
pub use embedding_config::EmbeddingConfig;
pub use lock_config::LockConfig;
pub use promotion_config::PromotionConfig;
pub use resilience_config::{CircuitBreakerConfig, RateLimitConfig, ResilienceConfig, TimeoutConfig};
pub use runtime_config::RuntimeConfig;
pub use synthesis_config::SynthesisConfig;

/// Top-level configuration aggregating all subsystem configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrataConfig {
    pub ciar: CiarConfig,
    pub resilience: ResilienceConfig,
    pub embedding: EmbeddingConfig,
    pub promotion: PromotionConfig,
    pub consolidation: ConsolidationConfig,
    pub distillation: DistillationConfig,
    pub synthesis: SynthesisConfig,
    pub lock: LockConfig,
    pub runtime: RuntimeConfig,
}

impl StrataConfig {
    /// Load config from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Validate every section. A failure here is fatal: the affected engine
    /// must not start.
    pub fn validate(&self) -> StrataResult<()> {
        self.ciar.validate()?;
        self.resilience.validate()?;
        self.embedding.validate()?;
        self.promotion.validate()?;
        self.consolidation.validate()?;
        self.distillation.validate()?;
        self.synthesis.validate()?;
        self.lock.validate()?;
        Ok(())
    }
}

/// Check that `value` lies in [0, 1].
pub(crate) fn ensure_unit_interval(field: &str, value: f64) -> StrataResult<()> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(StrataError::ConfigError(format!(
            "{field} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Check that `value` is strictly positive.
pub(crate) fn ensure_positive(field: &str, value: f64) -> StrataResult<()> {
    if value <= 0.0 || !value.is_finite() {
        return Err(StrataError::ConfigError(format!(
            "{field} must be > 0, got {value}"
        )));
    }
    Ok(())
}
