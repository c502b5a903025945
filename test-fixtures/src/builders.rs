//! Record builders with sensible defaults.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use strata_core::config::{EmbeddingConfig, StrataConfig};
use strata_core::models::{
    DocumentType, Episode, Fact, FactType, IndexSide, KnowledgeDocument, ProcessingPath, TurnRange,
    TurnRecord, TurnRole, WriteStatus,
};

use crate::embedder::DeterministicEmbedder;

/// Embedding width used across fixture records.
pub const TEST_DIMENSIONS: usize = 64;

/// A fixed instant so fixture ids and windows are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Default config with the embedding dimension set.
pub fn test_config() -> StrataConfig {
    StrataConfig {
        embedding: EmbeddingConfig::with_dimensions(TEST_DIMENSIONS),
        ..Default::default()
    }
}

/// A user turn one minute after the previous sequence number.
pub fn turn(session: &str, sequence: u64, text: &str) -> TurnRecord {
    TurnRecord::new(
        session,
        sequence,
        TurnRole::User,
        text,
        base_time() + Duration::minutes(sequence as i64),
    )
}

pub fn turn_at(
    session: &str,
    sequence: u64,
    role: TurnRole,
    text: &str,
    at: DateTime<Utc>,
) -> TurnRecord {
    TurnRecord::new(session, sequence, role, text, at)
}

pub struct FactBuilder {
    fact: Fact,
}

impl FactBuilder {
    pub fn new(session: &str, content: &str) -> Self {
        let source_turn_ids = vec![TurnRecord::compute_id(session, 1)];
        Self {
            fact: Fact {
                id: Fact::compute_id(session, &source_turn_ids, content),
                session_id: session.to_string(),
                content: content.to_string(),
                fact_type: FactType::Preference,
                certainty: 0.9,
                impact: 0.8,
                created_at: base_time(),
                last_referenced_at: base_time(),
                source_turn_range: TurnRange { start: 1, end: 1 },
                source_turn_ids,
                ciar_score: 0.72,
                topic: None,
                entities: Vec::new(),
                embedding: Some(DeterministicEmbedder::vector(TEST_DIMENSIONS, content)),
                extraction: ProcessingPath::Generated,
                consolidated_episode_id: None,
                consolidated: false,
            },
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.fact.created_at = at;
        self.fact.last_referenced_at = at;
        self
    }

    /// Source turn sequence; also re-derives the id.
    pub fn turn(mut self, sequence: u64) -> Self {
        let session = self.fact.session_id.clone();
        self.fact.source_turn_ids = vec![TurnRecord::compute_id(&session, sequence)];
        self.fact.source_turn_range = TurnRange {
            start: sequence,
            end: sequence,
        };
        self.fact.id = Fact::compute_id(&session, &self.fact.source_turn_ids, &self.fact.content);
        self
    }

    pub fn fact_type(mut self, fact_type: FactType) -> Self {
        self.fact.fact_type = fact_type;
        self
    }

    pub fn entities(mut self, entities: &[&str]) -> Self {
        self.fact.entities = entities.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn topic(mut self, topic: &str) -> Self {
        self.fact.topic = Some(topic.to_string());
        self
    }

    pub fn embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.fact.embedding = embedding;
        self
    }

    pub fn build(self) -> Fact {
        self.fact
    }
}

pub struct EpisodeBuilder {
    episode: Episode,
}

impl EpisodeBuilder {
    pub fn new(session: &str, fact_ids: &[&str]) -> Self {
        let source_fact_ids: Vec<String> = fact_ids.iter().map(|f| f.to_string()).collect();
        let narrative = format!("episode over {}", source_fact_ids.join(", "));
        Self {
            episode: Episode {
                id: Episode::compute_id(session, &source_fact_ids),
                session_id: session.to_string(),
                window_start: base_time(),
                window_end: base_time() + Duration::hours(24),
                embedding: DeterministicEmbedder::vector(TEST_DIMENSIONS, &narrative),
                narrative,
                entities: Vec::new(),
                topics: Vec::new(),
                source_fact_ids,
                write_status: WriteStatus::Committed,
                narration: ProcessingPath::Generated,
                created_at: base_time(),
                committed_at: Some(base_time()),
            },
        }
    }

    pub fn entities(mut self, entities: &[&str]) -> Self {
        self.episode.entities = entities.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn topics(mut self, topics: &[&str]) -> Self {
        self.episode.topics = topics.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn narrative(mut self, narrative: &str) -> Self {
        self.episode.narrative = narrative.to_string();
        self.episode.embedding = DeterministicEmbedder::vector(TEST_DIMENSIONS, narrative);
        self
    }

    /// Creation and commit time together.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.episode.created_at = at;
        self.episode.committed_at = Some(at);
        self
    }

    /// Only `succeeded` holds the episode.
    pub fn partial(mut self, succeeded: IndexSide) -> Self {
        self.episode.write_status = WriteStatus::Partial { succeeded };
        self.episode.committed_at = None;
        self
    }

    pub fn build(self) -> Episode {
        self.episode
    }
}

pub struct KnowledgeBuilder {
    doc: KnowledgeDocument,
}

impl KnowledgeBuilder {
    pub fn new(id: &str, document_type: DocumentType, content: &str) -> Self {
        Self {
            doc: KnowledgeDocument {
                id: id.to_string(),
                document_type,
                topic_key: "general".to_string(),
                content: content.to_string(),
                metadata: BTreeMap::new(),
                source_episode_ids: vec!["ep-1".to_string()],
                created_at: base_time(),
                embedding: Some(DeterministicEmbedder::vector(TEST_DIMENSIONS, content)),
                synthesis: ProcessingPath::Generated,
            },
        }
    }

    pub fn topic(mut self, topic_key: &str) -> Self {
        self.doc.topic_key = topic_key.to_string();
        self
    }

    pub fn meta(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.doc.metadata.insert(field.to_string(), value.into());
        self
    }

    pub fn episodes(mut self, ids: &[&str]) -> Self {
        self.doc.source_episode_ids = ids.iter().map(|i| i.to_string()).collect();
        self
    }

    pub fn embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.doc.embedding = embedding;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.doc.created_at = at;
        self
    }

    pub fn build(self) -> KnowledgeDocument {
        self.doc
    }
}
