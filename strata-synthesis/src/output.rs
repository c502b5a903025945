//! Structured output of the synthesis call.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesisOutput {
    pub answer: String,
    pub cited_document_ids: Vec<String>,
}

impl SynthesisOutput {
    /// The answer must be non-blank and cite only documents it was shown.
    pub fn validate(&self, candidates: &HashSet<&str>) -> Result<(), String> {
        if self.answer.trim().is_empty() {
            return Err("empty answer".into());
        }
        if self.cited_document_ids.is_empty() {
            return Err("answer cites no documents".into());
        }
        if let Some(unknown) = self
            .cited_document_ids
            .iter()
            .find(|id| !candidates.contains(id.as_str()))
        {
            return Err(format!("cites unknown document {unknown}"));
        }
        Ok(())
    }
}

pub fn synthesis_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["answer", "cited_document_ids"],
        "properties": {
            "answer": { "type": "string", "minLength": 1 },
            "cited_document_ids": {
                "type": "array",
                "minItems": 1,
                "items": { "type": "string" }
            }
        }
    })
}
