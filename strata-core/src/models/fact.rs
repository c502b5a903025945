//! L2: scored, compressed facts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{stable_id, ProcessingPath};

/// Kind of claim a fact records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Preference,
    Constraint,
    Instruction,
    Personal,
    Decision,
    Observation,
    Topic,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Constraint => "constraint",
            Self::Instruction => "instruction",
            Self::Personal => "personal",
            Self::Decision => "decision",
            Self::Observation => "observation",
            Self::Topic => "topic",
        }
    }
}

/// Inclusive range of turn sequence numbers a fact was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRange {
    pub start: u64,
    pub end: u64,
}

impl TurnRange {
    pub fn contains(&self, sequence: u64) -> bool {
        (self.start..=self.end).contains(&sequence)
    }
}

/// A scored claim or topic segment promoted out of L1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Content-derived; the same extraction always yields the same id.
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub fact_type: FactType,
    pub certainty: f64,
    pub impact: f64,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the newest source turn.
    pub last_referenced_at: DateTime<Utc>,
    pub source_turn_range: TurnRange,
    /// Provenance. Never empty.
    pub source_turn_ids: Vec<String>,
    pub ciar_score: f64,
    pub topic: Option<String>,
    pub entities: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub extraction: ProcessingPath,
    /// Set once the fact's episode is committed to both indices.
    pub consolidated_episode_id: Option<String>,
    pub consolidated: bool,
}

impl Fact {
    pub fn compute_id(session_id: &str, source_turn_ids: &[String], content: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(source_turn_ids.len() + 2);
        parts.push(session_id);
        parts.extend(source_turn_ids.iter().map(String::as_str));
        parts.push(content);
        stable_id("fact", &parts)
    }
}
