//! Structured output of the topic segmentation call.
//!
//! Parsing is strict: unknown fields, unknown fact types and out-of-range
//! numbers reject the whole response.

use serde::Deserialize;
use serde_json::{json, Value};

use strata_core::models::FactType;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentationOutput {
    pub facts: Vec<ExtractedFact>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedFact {
    pub content: String,
    pub fact_type: FactType,
    pub certainty: f64,
    pub impact: f64,
    pub turn_start: u64,
    pub turn_end: u64,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl SegmentationOutput {
    /// Check every fact against the sequence numbers of the batch it was
    /// drawn from.
    pub fn validate(&self, batch_sequences: &[u64]) -> Result<(), String> {
        let (Some(&first_sequence), Some(&last_sequence)) =
            (batch_sequences.iter().min(), batch_sequences.iter().max())
        else {
            return Err("empty batch".into());
        };
        for (i, fact) in self.facts.iter().enumerate() {
            if fact.content.trim().is_empty() {
                return Err(format!("fact {i}: empty content"));
            }
            for (name, v) in [("certainty", fact.certainty), ("impact", fact.impact)] {
                if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                    return Err(format!("fact {i}: {name} {v} outside [0, 1]"));
                }
            }
            if fact.turn_start > fact.turn_end {
                return Err(format!(
                    "fact {i}: turn range {}..{} is inverted",
                    fact.turn_start, fact.turn_end
                ));
            }
            if fact.turn_start < first_sequence || fact.turn_end > last_sequence {
                return Err(format!(
                    "fact {i}: turn range {}..{} outside batch {first_sequence}..{last_sequence}",
                    fact.turn_start, fact.turn_end
                ));
            }
            if !batch_sequences
                .iter()
                .any(|s| (fact.turn_start..=fact.turn_end).contains(s))
            {
                return Err(format!(
                    "fact {i}: turn range {}..{} covers no turn of the batch",
                    fact.turn_start, fact.turn_end
                ));
            }
        }
        Ok(())
    }
}

/// JSON schema sent with the request.
pub fn segmentation_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["facts"],
        "properties": {
            "facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["content", "fact_type", "certainty", "impact", "turn_start", "turn_end"],
                    "properties": {
                        "content": { "type": "string", "minLength": 1 },
                        "fact_type": {
                            "enum": ["preference", "constraint", "instruction", "personal", "decision", "observation", "topic"]
                        },
                        "certainty": { "type": "number", "minimum": 0, "maximum": 1 },
                        "impact": { "type": "number", "minimum": 0, "maximum": 1 },
                        "turn_start": { "type": "integer", "minimum": 0 },
                        "turn_end": { "type": "integer", "minimum": 0 },
                        "topic": { "type": ["string", "null"] },
                        "entities": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}
