//! # strata-scoring
//!
//! CIAR (Certainty-Impact-Age-Recency) significance scoring. Decides which
//! extracted facts survive promotion from L1 into L2.
//!
//! `score = clamp(certainty × impact × decay(age) × recency_boost(since_ref), 0, 1)`

pub mod decay;
pub mod scorer;

pub use scorer::{CiarBreakdown, CiarInput, CiarScorer};
