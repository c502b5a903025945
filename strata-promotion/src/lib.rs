//! # strata-promotion
//!
//! Moves raw turns (L1) into scored facts (L2).
//!
//! A cycle enumerates sessions with unprocessed turns, drains each in
//! batches, segments every batch into candidate facts with one generation
//! call (or the lexical fallback when generation is degraded), scores them
//! with CIAR and writes the survivors. Every turn in a handled batch is marked
//! processed, promoted or not.

pub mod engine;
pub mod fallback;
pub mod ingest;
pub mod schema;
pub mod segmenter;

pub use engine::{EngineState, PromotionCycleReport, PromotionEngine, PromotionStats, PromotionTotals};
pub use fallback::FallbackExtractor;
pub use ingest::ingest_turn;
pub use segmenter::{SegmentedBatch, TopicSegmenter};
