//! L3 → L4 distillation configuration.

use serde::{Deserialize, Serialize};

use super::DomainSchema;
use crate::errors::{StrataError, StrataResult};
use crate::models::DocumentType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillationConfig {
    pub enabled: bool,
    pub cycle_interval_secs: u64,
    /// Undistilled episodes a key needs before distillation fires.
    pub episode_threshold: usize,
    /// Document types produced per distillation pass.
    pub document_types: Vec<DocumentType>,
    /// Newly committed episodes read per cycle. Also the page size when
    /// reading a key's stored documents.
    pub episode_scan_limit: usize,
    /// Domain metadata schema for produced documents.
    pub domain: DomainSchema,
}

impl Default for DistillationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_interval_secs: 900,
            episode_threshold: 5,
            document_types: DocumentType::all().to_vec(),
            episode_scan_limit: 5_000,
            domain: DomainSchema::default(),
        }
    }
}

impl DistillationConfig {
    pub fn validate(&self) -> StrataResult<()> {
        if self.episode_threshold == 0 {
            return Err(StrataError::ConfigError(
                "distillation.episode_threshold must be >= 1".into(),
            ));
        }
        if self.document_types.is_empty() {
            return Err(StrataError::ConfigError(
                "distillation.document_types must name at least one type".into(),
            ));
        }
        if self.episode_scan_limit == 0 {
            return Err(StrataError::ConfigError(
                "distillation.episode_scan_limit must be >= 1".into(),
            ));
        }
        if self.cycle_interval_secs == 0 {
            return Err(StrataError::ConfigError(
                "distillation.cycle_interval_secs must be >= 1".into(),
            ));
        }
        self.domain.validate()
    }
}
