//! Discrete lifecycle events for an external telemetry collector.
//!
//! Each event carries enough ids to rebuild provenance chains without
//! re-querying storage.

use serde::{Deserialize, Serialize};

use super::{DocumentType, IndexSide, ProcessingPath};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    FactPromoted {
        fact_id: String,
        session_id: String,
        ciar_score: f64,
        source_turn_ids: Vec<String>,
    },
    FactRejected {
        session_id: String,
        ciar_score: f64,
        source_turn_ids: Vec<String>,
    },
    BatchPromoted {
        session_id: String,
        turn_ids: Vec<String>,
        promoted: usize,
        rejected: usize,
        path: ProcessingPath,
    },
    EpisodeCreated {
        episode_id: String,
        session_id: String,
        source_fact_ids: Vec<String>,
        path: ProcessingPath,
    },
    EpisodeWritePartial {
        episode_id: String,
        succeeded: Option<IndexSide>,
        pending: Vec<IndexSide>,
    },
    EpisodeRepaired {
        episode_id: String,
        source_fact_ids: Vec<String>,
        attempts: u32,
    },
    KnowledgeDistilled {
        knowledge_id: String,
        document_type: DocumentType,
        topic_key: String,
        source_episode_ids: Vec<String>,
    },
    KnowledgeSynthesized {
        query_id: String,
        source_documents: Vec<String>,
        conflicts: usize,
        cache_hit: bool,
    },
    CircuitOpened {
        breaker: String,
        failures: u32,
    },
    CircuitClosed {
        breaker: String,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FactPromoted { .. } => "fact_promoted",
            Self::FactRejected { .. } => "fact_rejected",
            Self::BatchPromoted { .. } => "batch_promoted",
            Self::EpisodeCreated { .. } => "episode_created",
            Self::EpisodeWritePartial { .. } => "episode_write_partial",
            Self::EpisodeRepaired { .. } => "episode_repaired",
            Self::KnowledgeDistilled { .. } => "knowledge_distilled",
            Self::KnowledgeSynthesized { .. } => "knowledge_synthesized",
            Self::CircuitOpened { .. } => "circuit_opened",
            Self::CircuitClosed { .. } => "circuit_closed",
        }
    }
}
