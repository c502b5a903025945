//! Topic segmentation: one generation call per batch, rule-based fallback
//! when that call fails or its output is rejected.

use std::sync::Arc;

use tracing::{debug, warn};

use strata_core::models::{
    Fact, FactType, GenerationRequest, ProcessingPath, TaskType, TurnRange, TurnRecord,
};

use crate::fallback::FallbackExtractor;
use crate::schema::{segmentation_schema, SegmentationOutput};
use strata_resilience::ResilientGenerator;

/// Candidate facts for one batch, unscored.
#[derive(Debug, Clone)]
pub struct SegmentedBatch {
    pub facts: Vec<Fact>,
    pub path: ProcessingPath,
}

pub struct TopicSegmenter {
    generator: Arc<ResilientGenerator>,
    fallback: FallbackExtractor,
    fallback_certainty: f64,
}

impl TopicSegmenter {
    pub fn new(generator: Arc<ResilientGenerator>, fallback_certainty: f64) -> Self {
        Self {
            generator,
            fallback: FallbackExtractor::new(),
            fallback_certainty,
        }
    }

    /// Segment a batch of turns from one session, ordered by sequence.
    pub async fn segment(&self, session_id: &str, batch: &[TurnRecord]) -> SegmentedBatch {
        if batch.is_empty() {
            return SegmentedBatch {
                facts: Vec::new(),
                path: ProcessingPath::Generated,
            };
        }
        let sequences: Vec<u64> = batch.iter().map(|t| t.sequence).collect();

        let request = GenerationRequest::new(TaskType::TopicSegmentation, render_prompt(batch))
            .with_schema(segmentation_schema())
            .with_max_output_tokens(1_024);
        let result = self
            .generator
            .generate_validated::<SegmentationOutput, _>(&request, |out| out.validate(&sequences))
            .await;

        match result {
            Ok(output) => {
                let facts = output
                    .facts
                    .into_iter()
                    .filter_map(|f| {
                        let range = TurnRange {
                            start: f.turn_start,
                            end: f.turn_end,
                        };
                        build_fact(
                            session_id,
                            batch,
                            range,
                            f.content,
                            f.fact_type,
                            f.certainty,
                            f.impact,
                            f.topic,
                            f.entities,
                            ProcessingPath::Generated,
                        )
                    })
                    .collect::<Vec<_>>();
                debug!(session_id, facts = facts.len(), "batch segmented");
                SegmentedBatch {
                    facts,
                    path: ProcessingPath::Generated,
                }
            }
            Err(e) => {
                warn!(session_id, error = %e, "segmentation degraded, using lexical fallback");
                let facts = self
                    .fallback
                    .extract(batch)
                    .into_iter()
                    .filter_map(|m| {
                        build_fact(
                            session_id,
                            batch,
                            TurnRange {
                                start: m.sequence,
                                end: m.sequence,
                            },
                            m.content,
                            m.fact_type,
                            self.fallback_certainty,
                            m.impact,
                            None,
                            m.entities,
                            ProcessingPath::Fallback,
                        )
                    })
                    .collect();
                SegmentedBatch {
                    facts,
                    path: ProcessingPath::Fallback,
                }
            }
        }
    }
}

fn render_prompt(batch: &[TurnRecord]) -> String {
    let mut prompt = String::from(
        "Segment the conversation below into compressed facts. For each fact give its \
         type, a certainty and an impact in [0, 1], and the first and last turn numbers \
         it is drawn from. Skip small talk.\n\n",
    );
    for turn in batch {
        prompt.push_str(&format!("[{}] {}: {}\n", turn.sequence, turn.role.as_str(), turn.text));
    }
    prompt
}

/// `None` when no batch turn falls inside `range`; a fact without source
/// turns has no provenance and is never built.
#[allow(clippy::too_many_arguments)]
fn build_fact(
    session_id: &str,
    batch: &[TurnRecord],
    range: TurnRange,
    content: String,
    fact_type: FactType,
    certainty: f64,
    impact: f64,
    topic: Option<String>,
    entities: Vec<String>,
    extraction: ProcessingPath,
) -> Option<Fact> {
    let sources: Vec<&TurnRecord> = batch.iter().filter(|t| range.contains(t.sequence)).collect();
    let created_at = sources.first()?.timestamp;
    let last_referenced_at = sources.last()?.timestamp;
    let source_turn_ids: Vec<String> = sources.iter().map(|t| t.id.clone()).collect();
    let content = content.trim().to_string();

    Some(Fact {
        id: Fact::compute_id(session_id, &source_turn_ids, &content),
        session_id: session_id.to_string(),
        content,
        fact_type,
        certainty,
        impact,
        created_at,
        last_referenced_at,
        source_turn_range: range,
        source_turn_ids,
        ciar_score: 0.0,
        topic,
        entities,
        embedding: None,
        extraction,
        consolidated_episode_id: None,
        consolidated: false,
    })
}
