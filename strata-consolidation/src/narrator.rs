//! Episode narration with a verbatim fallback.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use strata_core::models::{normalize_key, Fact, GenerationRequest, ProcessingPath, TaskType};
use strata_resilience::ResilientGenerator;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NarrationOutput {
    pub narrative: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl NarrationOutput {
    pub fn validate(&self) -> Result<(), String> {
        if self.narrative.trim().is_empty() {
            return Err("empty narrative".into());
        }
        if self.entities.iter().chain(&self.topics).any(|k| k.trim().is_empty()) {
            return Err("blank entity or topic".into());
        }
        Ok(())
    }
}

fn narration_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["narrative"],
        "properties": {
            "narrative": { "type": "string", "minLength": 1 },
            "entities": { "type": "array", "items": { "type": "string" } },
            "topics": { "type": "array", "items": { "type": "string" } }
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub narrative: String,
    pub entities: Vec<String>,
    pub topics: Vec<String>,
    pub path: ProcessingPath,
}

pub struct EpisodeNarrator {
    generator: Arc<ResilientGenerator>,
}

impl EpisodeNarrator {
    pub fn new(generator: Arc<ResilientGenerator>) -> Self {
        Self { generator }
    }

    /// Narrate a cluster. Entities and topics carried by the facts are always
    /// kept, after any the generation adds.
    pub async fn narrate(&self, facts: &[Fact]) -> Narration {
        let request = GenerationRequest::new(TaskType::EpisodeNarration, render_prompt(facts))
            .with_schema(narration_schema())
            .with_max_output_tokens(512);
        match self
            .generator
            .generate_validated::<NarrationOutput, _>(&request, NarrationOutput::validate)
            .await
        {
            Ok(out) => {
                let (fact_entities, fact_topics) = fact_keys(facts);
                Narration {
                    narrative: out.narrative.trim().to_string(),
                    entities: merge_keys(out.entities, fact_entities),
                    topics: merge_keys(out.topics, fact_topics),
                    path: ProcessingPath::Generated,
                }
            }
            Err(e) => {
                warn!(facts = facts.len(), error = %e, "narration degraded, concatenating facts");
                Self::fallback(facts)
            }
        }
    }

    /// Fact contents joined in order; entities and topics from the facts.
    pub fn fallback(facts: &[Fact]) -> Narration {
        let (entities, topics) = fact_keys(facts);
        Narration {
            narrative: facts
                .iter()
                .map(|f| f.content.trim())
                .collect::<Vec<_>>()
                .join("\n"),
            entities,
            topics,
            path: ProcessingPath::Fallback,
        }
    }
}

fn render_prompt(facts: &[Fact]) -> String {
    let mut prompt = String::from(
        "Write a short third-person narrative that connects the facts below, and list \
         the entities and topics it concerns.\n\n",
    );
    for fact in facts {
        prompt.push_str(&format!(
            "- ({}) {} [{}]\n",
            fact.fact_type.as_str(),
            fact.content,
            fact.created_at.to_rfc3339()
        ));
    }
    prompt
}

fn fact_keys(facts: &[Fact]) -> (Vec<String>, Vec<String>) {
    let entities = merge_keys(Vec::new(), facts.iter().flat_map(|f| f.entities.iter().cloned()).collect());
    let topics = merge_keys(Vec::new(), facts.iter().filter_map(|f| f.topic.clone()).collect());
    (entities, topics)
}

/// Append `extra` to `base`, skipping keys that normalize to one already present.
fn merge_keys(base: Vec<String>, extra: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(base.len() + extra.len());
    for key in base.into_iter().chain(extra) {
        let key = key.trim().to_string();
        let normalized = normalize_key(&key);
        if normalized.is_empty() || out.iter().any(|k| normalize_key(k) == normalized) {
            continue;
        }
        out.push(key);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_fixtures::builders::FactBuilder;

    #[test]
    fn fallback_concatenates_and_unions() {
        let facts = vec![
            FactBuilder::new("s", "Prefers Earl Grey").turn(1).entities(&["Earl Grey"]).topic("tea").build(),
            FactBuilder::new("s", "Drinks earl grey at 4pm").turn(2).entities(&["earl  grey"]).topic("Tea").build(),
        ];
        let n = EpisodeNarrator::fallback(&facts);
        assert_eq!(n.narrative, "Prefers Earl Grey\nDrinks earl grey at 4pm");
        assert_eq!(n.entities, vec!["Earl Grey".to_string()]);
        assert_eq!(n.topics, vec!["tea".to_string()]);
        assert_eq!(n.path, ProcessingPath::Fallback);
    }

    #[test]
    fn output_validation_rejects_blank_narrative() {
        let out = NarrationOutput {
            narrative: "  ".into(),
            entities: vec![],
            topics: vec![],
        };
        assert!(out.validate().is_err());
    }

    #[test]
    fn merge_keeps_generated_keys_first() {
        let merged = merge_keys(vec!["Kyoto".into()], vec!["kyoto".into(), "April".into()]);
        assert_eq!(merged, vec!["Kyoto".to_string(), "April".to_string()]);
    }
}
