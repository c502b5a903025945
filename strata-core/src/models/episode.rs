//! L3: narrated episodes, dual-indexed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{normalize_key, stable_id, IndexSide, ProcessingPath};

/// Durability of an Episode across its two indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WriteStatus {
    /// Neither index has acknowledged.
    Pending,
    /// Exactly one index has acknowledged.
    Partial { succeeded: IndexSide },
    /// Both indices acknowledged.
    Committed,
}

impl WriteStatus {
    /// Status after `side` acknowledges.
    pub fn with_ack(self, side: IndexSide) -> Self {
        match self {
            Self::Pending => Self::Partial { succeeded: side },
            Self::Partial { succeeded } if succeeded != side => Self::Committed,
            other => other,
        }
    }

    /// Sides still owed a write.
    pub fn pending_sides(&self) -> Vec<IndexSide> {
        match self {
            Self::Pending => IndexSide::BOTH.to_vec(),
            Self::Partial { succeeded } => vec![succeeded.other()],
            Self::Committed => Vec::new(),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// A narrated cluster of facts bounded by a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Derived from the source fact ids, so a cluster maps to one episode.
    pub id: String,
    pub session_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub narrative: String,
    pub embedding: Vec<f32>,
    pub entities: Vec<String>,
    pub topics: Vec<String>,
    /// Provenance. Never empty.
    pub source_fact_ids: Vec<String>,
    pub write_status: WriteStatus,
    pub narration: ProcessingPath,
    pub created_at: DateTime<Utc>,
    /// When both indices last acknowledged. Set on every copy once committed,
    /// and refreshed by repairs.
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
}

impl Episode {
    pub fn compute_id(session_id: &str, source_fact_ids: &[String]) -> String {
        let mut sorted: Vec<&str> = source_fact_ids.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut parts = vec![session_id];
        parts.extend(sorted);
        stable_id("ep", &parts)
    }

    /// Normalized entity and topic keys this episode counts toward.
    pub fn keys(&self) -> BTreeSet<String> {
        self.entities
            .iter()
            .chain(self.topics.iter())
            .map(|k| normalize_key(k))
            .filter(|k| !k.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_status_transitions() {
        let s = WriteStatus::Pending.with_ack(IndexSide::Similarity);
        assert_eq!(
            s,
            WriteStatus::Partial {
                succeeded: IndexSide::Similarity
            }
        );
        assert_eq!(s.pending_sides(), vec![IndexSide::Relationship]);
        // A repeated ack from the same side changes nothing.
        assert_eq!(s.with_ack(IndexSide::Similarity), s);
        assert_eq!(s.with_ack(IndexSide::Relationship), WriteStatus::Committed);
        assert!(WriteStatus::Committed.pending_sides().is_empty());
    }

    #[test]
    fn episode_id_ignores_fact_order() {
        let a = Episode::compute_id("s", &["f2".into(), "f1".into()]);
        let b = Episode::compute_id("s", &["f1".into(), "f2".into()]);
        assert_eq!(a, b);
    }
}
