//! # strata-consolidation
//!
//! Turns scored facts (L2) into narrated episodes (L3).
//!
//! Facts are clustered per session inside fixed time windows, each ready
//! cluster is narrated and embedded once, and the resulting Episode is written
//! to both the similarity and the relationship index. A write that only
//! reaches one side (or neither) goes to the [`RepairQueue`], which replays the
//! missing side on later cycles without narrating again.

pub mod clusterer;
pub mod engine;
pub mod narrator;
pub mod repair;

pub use clusterer::{ClusterPlan, EpisodeClusterer, FactCluster};
pub use engine::{
    ConsolidationCycleReport, ConsolidationEngine, ConsolidationStats, ConsolidationStores,
    ConsolidationTotals,
};
pub use narrator::{EpisodeNarrator, Narration, NarrationOutput};
pub use repair::{RepairCheckpoint, RepairQueue, RepairTask};
