//! L4: distilled knowledge documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProcessingPath;

/// Kind of distilled insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Summary,
    Insight,
    Pattern,
    Recommendation,
    Rule,
}

impl DocumentType {
    pub fn all() -> &'static [DocumentType] {
        &[
            Self::Summary,
            Self::Insight,
            Self::Pattern,
            Self::Recommendation,
            Self::Rule,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Insight => "insight",
            Self::Pattern => "pattern",
            Self::Recommendation => "recommendation",
            Self::Rule => "rule",
        }
    }
}

/// A distilled, typed insight with full provenance.
///
/// Several documents may exist for the same topic key; they record how the
/// context evolved and are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub document_type: DocumentType,
    /// Normalized entity or topic key the document was distilled for.
    pub topic_key: String,
    pub content: String,
    /// Domain attributes, validated against the configured schema.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Provenance. Never empty.
    pub source_episode_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub embedding: Option<Vec<f32>>,
    pub synthesis: ProcessingPath,
}
