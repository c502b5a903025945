//! The assembled pipeline with generation, embedding or an index down.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;

use strata_core::models::{
    Episode, Fact, KnowledgeDocument, ProcessingPath, SynthesisQuery, TaskType, TurnRecord, TurnRole,
};
use strata_core::traits::ITierStore;
use strata_core::{ManualClock, StrataConfig};
use strata_promotion::ingest_turn;
use strata_resilience::BreakerState;
use strata_runtime::{Collaborators, Strata, StrataStores};
use test_fixtures::builders::{base_time, test_config, EpisodeBuilder, TEST_DIMENSIONS};
use test_fixtures::{
    DeterministicEmbedder, GraphEpisodeStore, InMemoryTierStore, MockGenerator, RecordingSink,
};

struct World {
    strata: Strata,
    turns: Arc<InMemoryTierStore<TurnRecord>>,
    facts: Arc<InMemoryTierStore<Fact>>,
    similarity: Arc<InMemoryTierStore<Episode>>,
    relationship: Arc<GraphEpisodeStore>,
    knowledge: Arc<InMemoryTierStore<KnowledgeDocument>>,
    mock: Arc<MockGenerator>,
    embedder: Arc<DeterministicEmbedder>,
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
    let embedder = DeterministicEmbedder::new(TEST_DIMENSIONS);
    let clock = Arc::new(ManualClock::new(base_time()));
    let sink = RecordingSink::new();

    mock.set_default(
        TaskType::EpisodeNarration,
        json!({ "narrative": "The user prefers green tea.", "entities": ["Green Tea"], "topics": [] }),
    );
    mock.respond_with(TaskType::KnowledgeSynthesis, |request| {
        let cited: Vec<String> = request
            .prompt
            .lines()
            .filter_map(|l| l.strip_prefix("- ["))
            .filter_map(|l| l.split(']').next())
            .map(str::to_string)
            .collect();
        json!({ "answer": "Green tea, every morning.", "cited_document_ids": cited })
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
        Collaborators::new(mock.clone(), embedder.clone())
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
        embedder,
        clock,
        sink,
    }
}

/// Two lexical preference cues in a full batch of ten.
async fn ingest_preferences(w: &World, session: &str) {
    for sequence in 1..=10u64 {
        let (role, text) = match sequence {
            2 => (TurnRole::User, "I prefer Green Tea in the morning"),
            6 => (TurnRole::User, "I prefer Green Tea every morning"),
            s if s % 2 == 0 => (TurnRole::User, "What is on the agenda?"),
            _ => (TurnRole::Assistant, "Here is the agenda."),
        };
        ingest_turn(w.turns.as_ref(), w.clock.as_ref(), session, sequence, role, text)
            .await
            .unwrap();
        w.clock.advance(Duration::minutes(1));
    }
}

async fn commit_tea_episodes(w: &World, count: usize) {
    for i in 0..count {
        let fact_id = format!("seeded-{i}");
        let episode = EpisodeBuilder::new(&format!("old-{i}"), &[fact_id.as_str()])
            .entities(&["Green Tea"])
            .narrative(&format!("Session {i}: green tea again."))
            .build();
        w.similarity.seed(episode.clone());
        w.relationship.store(&episode).await.unwrap();
    }
}

fn tea_query() -> SynthesisQuery {
    SynthesisQuery::new("What does the user drink?").with_topic("green tea")
}

#[tokio::test]
async fn generation_outage_degrades_every_tier_and_opens_the_breaker() {
    let mut config = test_config();
    config.resilience.circuit_breaker.failure_threshold = 2;
    let w = world(config).await;
    w.mock.set_failing(true);
    ingest_preferences(&w, "s1").await;

    let promotion = w.strata.promotion.run_cycle().await.unwrap();
    assert_eq!(promotion.fallback_batches, 1);
    assert_eq!(promotion.facts_promoted, 2);
    assert!(w.facts.all().iter().all(|f| f.extraction == ProcessingPath::Fallback));

    let consolidation = w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(consolidation.episodes_committed, 1);
    assert_eq!(consolidation.fallback_narrations, 1);
    assert_eq!(w.strata.generator.breaker().state(), BreakerState::Open);
    assert_eq!(w.sink.count("circuit_opened"), 1);

    commit_tea_episodes(&w, 4).await;
    let calls_before = w.mock.total_calls();
    let distillation = w.strata.distillation.run_cycle().await.unwrap();
    assert!(distillation.keys_distilled >= 1);
    assert!(distillation.fallback_passes >= 1);
    // Short-circuited by the open breaker.
    assert_eq!(w.mock.total_calls(), calls_before);
    let docs = w.knowledge.all();
    assert!(!docs.is_empty());
    assert!(docs.iter().all(|d| d.synthesis == ProcessingPath::Fallback));
    assert!(docs.iter().all(|d| d.source_episode_ids.len() == 5));

    let answer = w.strata.synthesizer.synthesize(&tea_query()).await.unwrap();
    assert_eq!(answer.path, ProcessingPath::Fallback);
    assert!(!answer.synthesized_text.is_empty());
}

#[tokio::test]
async fn breaker_recovers_after_cooldown() {
    let mut config = test_config();
    config.resilience.circuit_breaker.failure_threshold = 2;
    let cooldown = config.resilience.circuit_breaker.cooldown_secs as i64;
    let w = world(config).await;
    w.mock.set_failing(true);
    ingest_preferences(&w, "s1").await;
    w.strata.promotion.run_cycle().await.unwrap();
    w.strata.consolidation.run_cycle().await.unwrap();
    commit_tea_episodes(&w, 4).await;
    w.strata.distillation.run_cycle().await.unwrap();
    assert_eq!(w.strata.generator.breaker().state(), BreakerState::Open);

    w.mock.set_failing(false);
    w.clock.advance(Duration::seconds(cooldown + 1));
    let answer = w.strata.synthesizer.synthesize(&tea_query()).await.unwrap();
    assert_eq!(answer.path, ProcessingPath::Generated);
    assert_eq!(w.strata.generator.breaker().state(), BreakerState::Closed);
    assert_eq!(w.sink.count("circuit_closed"), 1);
}

#[tokio::test]
async fn embedding_outage_defers_consolidation_without_losing_facts() {
    let w = world(test_config()).await;
    w.mock.set_failing(true);
    ingest_preferences(&w, "s1").await;
    w.strata.promotion.run_cycle().await.unwrap();
    w.mock.set_failing(false);

    w.embedder.set_failing(true);
    let deferred = w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(deferred.episodes_committed, 0);
    assert!(w.similarity.is_empty());
    assert!(w.facts.all().iter().all(|f| !f.consolidated));

    w.embedder.set_failing(false);
    let recovered = w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(recovered.episodes_committed, 1);
    assert!(w.facts.all().iter().all(|f| f.consolidated));
}

#[tokio::test]
async fn half_written_episodes_are_invisible_to_distillation_until_repaired() {
    let mut config = test_config();
    config.distillation.episode_threshold = 1;
    let w = world(config).await;
    w.mock.set_failing(true);
    ingest_preferences(&w, "s1").await;
    w.strata.promotion.run_cycle().await.unwrap();
    w.mock.set_failing(false);

    w.relationship.fail_next_writes(1);
    let partial = w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(partial.episodes_partial, 1);
    assert_eq!(w.strata.consolidation.repairs().len(), 1);

    let skipped = w.strata.distillation.run_cycle().await.unwrap();
    assert_eq!(skipped.keys_distilled, 0);
    assert!(w.knowledge.is_empty());

    let repaired = w.strata.consolidation.run_cycle().await.unwrap();
    assert_eq!(repaired.repairs_completed, 1);
    let distilled = w.strata.distillation.run_cycle().await.unwrap();
    assert!(distilled.keys_distilled >= 1);
    assert!(!w.knowledge.is_empty());
}

#[tokio::test]
async fn l1_outage_leaves_turns_for_the_next_cycle() {
    let w = world(test_config()).await;
    ingest_preferences(&w, "s1").await;
    w.turns.set_fail_reads(true);
    assert!(w.strata.promotion.run_cycle().await.is_err());
    assert!(w.facts.is_empty());

    w.turns.set_fail_reads(false);
    w.mock.set_failing(true);
    let report = w.strata.promotion.run_cycle().await.unwrap();
    assert_eq!(report.turns_processed, 10);
    assert!(w.turns.all().iter().all(|t| t.processed));
}
