//! Turns to knowledge through every tier, on one assembled Strata.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;
use serde_json::{json, Value};

use strata_core::models::{
    DocumentType, Episode, Fact, KnowledgeDocument, ProcessingPath, SynthesisQuery, TaskType, TurnRecord, TurnRole,
};
use strata_core::{ManualClock, StrataConfig};
use strata_promotion::ingest_turn;
use strata_runtime::{Collaborators, Strata, StrataStores};
use test_fixtures::builders::{base_time, test_config, TEST_DIMENSIONS};
use test_fixtures::{
    DeterministicEmbedder, GraphEpisodeStore, InMemoryTierStore, MockGenerator, RecordingSink,
};

const SESSIONS: [&str; 5] = ["s1", "s2", "s3", "s4", "s5"];

struct World {
    strata: Strata,
    turns: Arc<InMemoryTierStore<TurnRecord>>,
    facts: Arc<InMemoryTierStore<Fact>>,
    similarity: Arc<InMemoryTierStore<Episode>>,
    relationship: Arc<GraphEpisodeStore>,
    knowledge: Arc<InMemoryTierStore<KnowledgeDocument>>,
    mock: Arc<MockGenerator>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
}

async fn world(config: StrataConfig) -> World {
    let turns = InMemoryTierStore::<TurnRecord>::new();
    let facts = InMemoryTierStore::<Fact>::new();
    let similarity = InMemoryTierStore::<Episode>::new();
    let relationship = GraphEpisodeStore::new();
    let knowledge = InMemoryTierStore::<KnowledgeDocument>::new();
    let mock = MockGenerator::new();
    let clock = Arc::new(ManualClock::new(base_time()));
    let sink = RecordingSink::new();

    mock.set_default(TaskType::TopicSegmentation, session_facts());
    mock.set_default(
        TaskType::EpisodeNarration,
        json!({
            "narrative": "The user repeatedly asks for green tea in the morning.",
            "entities": ["Green Tea"],
            "topics": ["beverages"]
        }),
    );
    mock.set_default(
        TaskType::KnowledgeDistillation,
        json!({ "documents": [
            { "document_type": "summary", "content": "The user drinks green tea every morning." },
            { "document_type": "insight", "content": "Green tea is a stable morning preference." },
            { "document_type": "pattern", "content": "Green tea requests open most sessions." },
            { "document_type": "recommendation", "content": "Suggest green tea first." },
            { "document_type": "rule", "content": "Default morning beverage to green tea." }
        ]}),
    );
    mock.respond_with(TaskType::KnowledgeSynthesis, |request| {
        let cited: Vec<String> = request
            .prompt
            .lines()
            .filter_map(|l| l.strip_prefix("- ["))
            .filter_map(|l| l.split(']').next())
            .map(str::to_string)
            .collect();
        json!({ "answer": "The user prefers green tea in the morning.", "cited_document_ids": cited })
    });

    let strata = Strata::assemble(
        config,
        StrataStores {
            turns: turns.clone(),
            facts: facts.clone(),
            similarity: similarity.clone(),
            relationship: relationship.clone(),
            knowledge: knowledge.clone(),
        },
        Collaborators::new(mock.clone(), DeterministicEmbedder::new(TEST_DIMENSIONS))
            .with_clock(clock.clone())
            .with_telemetry(sink.clone()),
    )
    .await
    .unwrap();

    World {
        strata,
        turns,
        facts,
        similarity,
        relationship,
        knowledge,
        mock,
        clock,
        sink,
    }
}

fn config() -> StrataConfig {
    let mut config = test_config();
    config.promotion.batch_size = 20;
    config
}

/// Three restatements of one preference and two throwaway remarks.
fn session_facts() -> Value {
    json!({ "facts": [
        {
            "content": "User prefers green tea in the morning",
            "fact_type": "preference", "certainty": 0.9, "impact": 0.8,
            "turn_start": 2, "turn_end": 3, "entities": ["Green Tea"]
        },
        {
            "content": "User prefers green tea every morning",
            "fact_type": "preference", "certainty": 0.9, "impact": 0.8,
            "turn_start": 8, "turn_end": 9, "entities": ["Green Tea"]
        },
        {
            "content": "User prefers green tea in the morning",
            "fact_type": "preference", "certainty": 0.95, "impact": 0.8,
            "turn_start": 15, "turn_end": 16, "entities": ["Green Tea"]
        },
        {
            "content": "User mentioned the weather is cloudy",
            "fact_type": "observation", "certainty": 0.4, "impact": 0.1,
            "turn_start": 5, "turn_end": 5
        },
        {
            "content": "User said the office printer jammed",
            "fact_type": "observation", "certainty": 0.5, "impact": 0.1,
            "turn_start": 12, "turn_end": 12
        }
    ]})
}

async fn ingest_session(w: &World, session: &str) {
    for sequence in 1..=20u64 {
        let (role, text) = match sequence {
            2 | 8 | 15 => (TurnRole::User, "I'd like green tea in the morning, as always"),
            5 => (TurnRole::User, "The weather is cloudy today"),
            12 => (TurnRole::User, "Ugh, the office printer jammed again"),
            s if s % 2 == 0 => (TurnRole::User, "Can you help me plan the week?"),
            _ => (TurnRole::Assistant, "Sure, here is what I have."),
        };
        ingest_turn(w.turns.as_ref(), w.clock.as_ref(), session, sequence, role, text)
            .await
            .unwrap();
        w.clock.advance(Duration::minutes(1));
    }
}

#[tokio::test]
async fn one_session_promotes_only_the_repeated_preference() {
    let w = world(config()).await;
    ingest_session(&w, "s1").await;

    let report = w.strata.promotion.run_cycle().await.unwrap();
    assert_eq!(report.turns_processed, 20);
    assert_eq!(report.facts_promoted, 3);
    assert_eq!(report.facts_rejected, 2);

    let facts = w.facts.all();
    assert!(facts.len() >= 3);
    assert!(facts.iter().all(|f| f.content.contains("green tea")));
    assert!(facts.iter().all(|f| f.ciar_score >= w.strata.config.ciar.threshold));
    assert!(w.turns.all().iter().all(|t| t.processed));
    assert_eq!(w.mock.calls(TaskType::TopicSegmentation), 1);
}

#[tokio::test]
async fn one_cluster_becomes_one_committed_episode() {
    let w = world(config()).await;
    ingest_session(&w, "s1").await;
    w.strata.promotion.run_cycle().await.unwrap();

    let report = w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(report.episodes_committed, 1);
    assert_eq!(w.similarity.len(), 1);
    assert_eq!(w.relationship.len(), 1);

    let episode = &w.similarity.all()[0];
    assert!(episode.write_status.is_committed());
    assert_eq!(episode.source_fact_ids.len(), 3);
    assert!(episode.keys().contains("green tea"));
    assert!(w.relationship.contains(&episode.id));
    assert!(w.facts.all().iter().all(|f| f.consolidated));

    // Nothing left to cluster.
    let again = w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(again.episodes_committed, 0);
    assert_eq!(w.similarity.len(), 1);
}

#[tokio::test]
async fn five_sessions_distill_documents_citing_every_episode() {
    let w = world(config()).await;
    for session in SESSIONS {
        ingest_session(&w, session).await;
    }
    w.strata.promotion.run_cycle().await.unwrap();
    assert_eq!(w.facts.len(), 15);

    w.strata.consolidation.run_cycle().await.unwrap();
    let episode_ids: BTreeSet<String> = w.similarity.all().into_iter().map(|e| e.id).collect();
    assert_eq!(episode_ids.len(), 5);
    assert_eq!(w.relationship.episodes_for_key("green tea").len(), 5);

    let report = w.strata.distillation.run_cycle().await.unwrap();
    assert!(report.keys_distilled >= 1);

    let tea_docs: Vec<KnowledgeDocument> = w
        .knowledge
        .all()
        .into_iter()
        .filter(|d| d.topic_key == "green tea")
        .collect();
    for wanted in [DocumentType::Summary, DocumentType::Insight] {
        let doc = tea_docs
            .iter()
            .find(|d| d.document_type == wanted)
            .unwrap_or_else(|| panic!("no {} document", wanted.as_str()));
        let cited: BTreeSet<String> = doc.source_episode_ids.iter().cloned().collect();
        assert_eq!(cited, episode_ids);
        assert_eq!(doc.synthesis, ProcessingPath::Generated);
    }
    assert!(w.sink.count("knowledge_distilled") >= 2);

    let result = w
        .strata
        .synthesizer
        .synthesize(&SynthesisQuery::new("What does the user drink in the morning?").with_topic("Green Tea"))
        .await
        .unwrap();
    assert_eq!(result.path, ProcessingPath::Generated);
    assert_eq!(result.source_documents.len(), tea_docs.len());
    assert!(result.synthesized_text.contains("green tea"));
}

#[tokio::test]
async fn four_sessions_are_not_enough_to_distill() {
    let w = world(config()).await;
    for session in &SESSIONS[..4] {
        ingest_session(&w, session).await;
    }
    w.strata.promotion.run_cycle().await.unwrap();
    w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(w.similarity.len(), 4);

    let report = w.strata.distillation.run_cycle().await.unwrap();
    assert_eq!(report.keys_distilled, 0);
    assert!(w.knowledge.is_empty());
    assert_eq!(w.mock.calls(TaskType::KnowledgeDistillation), 0);
}

#[tokio::test]
async fn promoted_facts_age_out_of_l1_and_l2() {
    let w = world(config()).await;
    ingest_session(&w, "s1").await;
    w.strata.promotion.run_cycle().await.unwrap();
    w.strata.consolidation.run_cycle().await.unwrap();

    let l1_ttl = w.strata.config.promotion.l1_ttl_hours as i64;
    w.clock.advance(Duration::hours(l1_ttl + 1));
    let report = w.strata.promotion.run_cycle().await.unwrap();
    assert_eq!(report.turns_evicted, 20);
    assert!(w.turns.is_empty());

    let l2_ttl = w.strata.config.consolidation.l2_ttl_hours as i64;
    w.clock.advance(Duration::hours(l2_ttl + 1));
    w.strata.consolidation.run_cycle().await.unwrap();
    assert!(w.facts.is_empty());
    // Episodes are the durable record.
    assert_eq!(w.similarity.len(), 1);
}
