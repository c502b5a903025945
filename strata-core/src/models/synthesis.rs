//! Query-time synthesis request and result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DocumentType, ProcessingPath};

/// A knowledge query narrowed by structured metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisQuery {
    pub query: String,
    /// Exact-match metadata constraints applied before any similarity work.
    pub metadata_filter: BTreeMap<String, serde_json::Value>,
    /// Empty means any type.
    pub document_types: Vec<DocumentType>,
    /// Restrict to one topic key.
    pub topic_key: Option<String>,
}

impl SynthesisQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata_filter.insert(field.into(), value.into());
        self
    }

    pub fn with_types(mut self, types: &[DocumentType]) -> Self {
        self.document_types = types.to_vec();
        self
    }

    pub fn with_topic(mut self, topic_key: impl Into<String>) -> Self {
        self.topic_key = Some(topic_key.into());
        self
    }
}

/// Near-duplicate documents grouped by embedding similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentGroup {
    pub representative_id: String,
    pub member_ids: Vec<String>,
}

/// One side of a disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictingValue {
    pub document_id: String,
    pub value: serde_json::Value,
}

/// Documents in scope that disagree on a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeConflict {
    pub field: String,
    pub values: Vec<ConflictingValue>,
}

impl KnowledgeConflict {
    pub fn document_ids(&self) -> Vec<&str> {
        self.values.iter().map(|v| v.document_id.as_str()).collect()
    }
}

/// A merged answer. Cached briefly, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub query_id: String,
    pub synthesized_text: String,
    /// Every document surfaced to the synthesis step.
    pub source_documents: Vec<String>,
    pub groups: Vec<DocumentGroup>,
    pub conflicts: Vec<KnowledgeConflict>,
    pub cache_hit: bool,
    pub path: ProcessingPath,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
