//! # strata-distillation
//!
//! Turns recurring L3 episodes into typed L4 knowledge documents.
//!
//! Episodes are grouped by their normalized entity and topic keys. A key with
//! enough uncited, committed episodes is distilled in one generation pass into
//! every configured document type, with domain metadata checked against the
//! configured schema. When generation is degraded, documents are rendered from
//! templates with the schema defaults.

pub mod engine;
pub mod metadata;
pub mod output;
pub mod scan;
pub mod templates;

pub use engine::{
    DistillationCycleReport, DistillationEngine, DistillationStats, DistillationStores,
    DistillationTotals,
};
pub use metadata::{default_metadata, validate_metadata, Metadata};
pub use output::{distillation_schema, DistillationOutput, DistilledDocument};
pub use scan::ScanCursor;
