#![allow(clippy::field_reassign_with_default)]
//! Config loading and fatal validation.
//!
//! - Partial TOML files fall back to defaults per field
//! - Unset embedding dimension is fatal
//! - Out-of-range thresholds are fatal

use strata_core::config::{DecayFunction, MetadataKind, StrataConfig};
use strata_core::errors::{EmbeddingError, StrataError};
use strata_core::models::DocumentType;

fn valid_config() -> StrataConfig {
    let mut config = StrataConfig::default();
    config.embedding.dimensions = Some(64);
    config
}

// ═══════════════════════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn defaults_match_documented_values() {
    let config = StrataConfig::default();
    assert_eq!(config.ciar.threshold, 0.6);
    assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
    assert_eq!(config.resilience.circuit_breaker.cooldown_secs, 60);
    assert_eq!(config.promotion.batch_size, 10);
    assert_eq!(config.consolidation.time_window_hours, 24);
    assert_eq!(config.consolidation.min_cluster_size, 2);
    assert_eq!(config.distillation.episode_threshold, 5);
    assert_eq!(config.distillation.document_types, DocumentType::all().to_vec());
    assert_eq!(config.synthesis.similarity_threshold, 0.85);
    assert_eq!(config.synthesis.cache_ttl_secs, 3_600);
}

#[test]
fn partial_toml_keeps_other_defaults() {
    let toml = r#"
        [embedding]
        dimensions = 384

        [promotion]
        batch_size = 20

        [ciar.decay]
        kind = "linear"
        horizon_hours = 720.0
    "#;
    let config = StrataConfig::from_toml(toml).unwrap();
    assert_eq!(config.embedding.dimensions, Some(384));
    assert_eq!(config.promotion.batch_size, 20);
    assert_eq!(config.promotion.max_batch_wait_secs, 300);
    assert_eq!(
        config.ciar.decay,
        DecayFunction::Linear {
            horizon_hours: 720.0
        }
    );
    assert!(config.validate().is_ok());
}

#[test]
fn domain_schema_loads_from_toml() {
    let toml = r#"
        [embedding]
        dimensions = 16

        [distillation.domain]
        name = "logistics"

        [[distillation.domain.fields]]
        name = "carrier"
        kind = "string"
        conflict_sensitive = true

        [[distillation.domain.fields]]
        name = "lanes"
        kind = "string_list"
        default = []
    "#;
    let config = StrataConfig::from_toml(toml).unwrap();
    let domain = &config.distillation.domain;
    assert_eq!(domain.name, "logistics");
    assert_eq!(domain.fields.len(), 2);
    assert_eq!(domain.fields[1].kind, MetadataKind::StringList);
    assert_eq!(domain.conflict_fields(), vec!["carrier"]);
    assert!(config.validate().is_ok());
}

// ═══════════════════════════════════════════════════════════════════════════
// Fatal configuration errors
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn unset_embedding_dimension_is_fatal() {
    let err = StrataConfig::default().validate().unwrap_err();
    assert!(matches!(
        err,
        StrataError::EmbeddingError(EmbeddingError::DimensionUnset)
    ));
}

#[test]
fn zero_embedding_dimension_is_fatal() {
    let mut config = valid_config();
    config.embedding.dimensions = Some(0);
    assert!(matches!(
        config.validate(),
        Err(StrataError::ConfigError(_))
    ));
}

#[test]
fn threshold_out_of_range_is_fatal() {
    let mut config = valid_config();
    config.ciar.threshold = 1.5;
    assert!(config.validate().is_err());

    let mut config = valid_config();
    config.synthesis.similarity_threshold = -0.1;
    assert!(config.validate().is_err());
}

#[test]
fn zero_timeouts_are_fatal() {
    let mut config = valid_config();
    config.resilience.timeouts.generation_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn renewal_must_beat_lease_expiry() {
    let mut config = valid_config();
    config.lock.renew_interval_secs = config.lock.lease_ttl_secs;
    assert!(config.validate().is_err());
}

#[test]
fn schema_default_must_match_kind() {
    let toml = r#"
        [embedding]
        dimensions = 16

        [[distillation.domain.fields]]
        name = "priority"
        kind = "number"
        default = "high"
    "#;
    let config = StrataConfig::from_toml(toml).unwrap();
    assert!(matches!(
        config.validate(),
        Err(StrataError::ConfigError(_))
    ));
}
