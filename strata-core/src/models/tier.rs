use std::fmt;

use serde::{Deserialize, Serialize};

/// One stage of the memory pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Recent raw turns.
    L1Working,
    /// Scored facts.
    L2Facts,
    /// Narrated episodes.
    L3Episodes,
    /// Distilled knowledge.
    L4Knowledge,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1Working => "l1_working",
            Self::L2Facts => "l2_facts",
            Self::L3Episodes => "l3_episodes",
            Self::L4Knowledge => "l4_knowledge",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two L3 indices an Episode is dual-written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSide {
    Similarity,
    Relationship,
}

impl IndexSide {
    pub const BOTH: [IndexSide; 2] = [IndexSide::Similarity, IndexSide::Relationship];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Relationship => "relationship",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Similarity => Self::Relationship,
            Self::Relationship => Self::Similarity,
        }
    }
}

impl fmt::Display for IndexSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an artifact came from the generation capability or the
/// deterministic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPath {
    Generated,
    Fallback,
}

impl ProcessingPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        }
    }
}
