//! Requests and responses exchanged with the generation capability.

use serde::{Deserialize, Serialize};

/// What a generation call is for. Providers may route on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    TopicSegmentation,
    EpisodeNarration,
    KnowledgeDistillation,
    KnowledgeSynthesis,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopicSegmentation => "topic_segmentation",
            Self::EpisodeNarration => "episode_narration",
            Self::KnowledgeDistillation => "knowledge_distillation",
            Self::KnowledgeSynthesis => "knowledge_synthesis",
        }
    }
}

/// A structured generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub task_type: TaskType,
    pub prompt: String,
    /// JSON description of the expected output shape.
    pub schema: Option<serde_json::Value>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(task_type: TaskType, prompt: impl Into<String>) -> Self {
        Self {
            task_type,
            prompt: prompt.into(),
            schema: None,
            max_output_tokens: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

/// Unvalidated structured output. Callers must validate before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub output: serde_json::Value,
    pub provider: String,
    pub tokens_used: Option<u32>,
}
