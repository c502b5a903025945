//! # strata-synthesis
//!
//! Query-time synthesis over L4 knowledge documents. Read-only: nothing here
//! writes to a tier.
//!
//! Candidates are narrowed by structured metadata before any similarity
//! work, grouped into near-duplicates, checked for metadata conflicts, and
//! merged into one answer that cites its sources. Results are cached briefly
//! by (query, filter).

pub mod cache;
pub mod conflicts;
pub mod grouping;
pub mod output;
pub mod synthesizer;

pub use cache::{cache_key, SynthesisCache};
pub use conflicts::{conflict_fields, detect_conflicts};
pub use grouping::group_near_duplicates;
pub use output::SynthesisOutput;
pub use synthesizer::{KnowledgeSynthesizer, SynthesisStats, SynthesisTotals};
