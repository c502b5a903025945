//! PromotionEngine cycles over in-memory tiers.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;

use strata_core::models::{Fact, FactType, ProcessingPath, TaskType, TurnRecord, TurnRole};
use strata_core::traits::ILifecycleEngine;
use strata_core::{Clock, ManualClock, StrataConfig};
use strata_promotion::{ingest_turn, EngineState, PromotionEngine};
use strata_resilience::ResilientGenerator;
use test_fixtures::builders::{base_time, test_config, turn, turn_at};
use test_fixtures::{InMemoryTierStore, MockGenerator, RecordingSink};

struct Harness {
    engine: PromotionEngine,
    l1: Arc<InMemoryTierStore<TurnRecord>>,
    l2: Arc<InMemoryTierStore<Fact>>,
    mock: Arc<MockGenerator>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
}

fn harness_with(config: StrataConfig) -> Harness {
    let l1 = InMemoryTierStore::<TurnRecord>::new();
    let l2 = InMemoryTierStore::<Fact>::new();
    let mock = MockGenerator::new();
    let clock = Arc::new(ManualClock::new(base_time()));
    let sink = RecordingSink::new();
    let generator = Arc::new(
        ResilientGenerator::from_config(mock.clone(), &config.resilience, clock.clone(), sink.clone())
            .unwrap(),
    );
    let engine = PromotionEngine::new(
        l1.clone(),
        l2.clone(),
        generator,
        &config,
        clock.clone(),
        sink.clone(),
    )
    .unwrap();
    Harness {
        engine,
        l1,
        l2,
        mock,
        clock,
        sink,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn seed_turns(h: &Harness, session: &str, count: u64) {
    for seq in 1..=count {
        h.l1.seed(turn(session, seq, &format!("turn number {seq} about travel plans")));
    }
}

fn one_fact(start: u64, end: u64, certainty: f64) -> serde_json::Value {
    json!({
        "facts": [{
            "content": "User is planning a trip to Kyoto in April",
            "fact_type": "decision",
            "certainty": certainty,
            "impact": 0.8,
            "turn_start": start,
            "turn_end": end,
            "topic": "travel",
            "entities": ["Kyoto"]
        }]
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Batching
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn partial_batch_waits_for_size_or_age() {
    let h = harness();
    seed_turns(&h, "s1", 3);
    h.mock.set_default(TaskType::TopicSegmentation, one_fact(1, 3, 0.9));
    h.clock.set(base_time() + Duration::minutes(4));

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.turns_deferred, 3);
    assert_eq!(report.batches, 0);
    assert_eq!(h.mock.total_calls(), 0);
    assert!(h.l2.is_empty());
    assert!(h.l1.all().iter().all(|t| !t.processed));

    // Oldest turn is now past the 5 minute wait.
    h.clock.advance(Duration::minutes(10));
    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.turns_processed, 3);
    assert_eq!(h.l2.len(), 1);
}

#[tokio::test]
async fn full_batch_is_processed_exactly_once() {
    let h = harness();
    seed_turns(&h, "s1", 10);
    h.mock.set_default(TaskType::TopicSegmentation, one_fact(2, 4, 0.9));
    h.clock.set(base_time() + Duration::minutes(11));

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.turns_processed, 10);
    assert_eq!(report.facts_promoted, 1);

    let facts = h.l2.all();
    assert_eq!(facts.len(), 1);
    let fact = &facts[0];
    assert_eq!(fact.source_turn_ids.len(), 3);
    assert_eq!(fact.source_turn_ids[0], TurnRecord::compute_id("s1", 2));
    assert_eq!(fact.extraction, ProcessingPath::Generated);
    assert!(fact.ciar_score >= 0.6);
    assert!(h.l1.all().iter().all(|t| t.processed));

    let again = h.engine.run_cycle().await.unwrap();
    assert_eq!(again.batches, 0);
    assert_eq!(h.mock.calls(TaskType::TopicSegmentation), 1);
    assert_eq!(h.engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn sessions_are_drained_independently() {
    let h = harness();
    seed_turns(&h, "a", 10);
    seed_turns(&h, "b", 10);
    h.mock.set_default(TaskType::TopicSegmentation, json!({ "facts": [] }));
    h.clock.set(base_time() + Duration::minutes(11));

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.sessions_seen, 2);
    assert_eq!(report.batches, 2);
    assert_eq!(report.turns_processed, 20);
    assert_eq!(h.sink.count("batch_promoted"), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// Scoring
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn low_score_facts_are_rejected_but_turns_still_processed() {
    let h = harness();
    seed_turns(&h, "s1", 10);
    h.mock.set_default(TaskType::TopicSegmentation, one_fact(1, 1, 0.2));
    h.clock.set(base_time() + Duration::minutes(11));

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.facts_rejected, 1);
    assert_eq!(report.facts_promoted, 0);
    assert!(h.l2.is_empty());
    assert!(h.l1.all().iter().all(|t| t.processed));
    assert_eq!(h.sink.count("fact_rejected"), 1);
    assert_eq!(h.sink.count("fact_promoted"), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Degradation
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn failing_generation_uses_lexical_fallback() {
    let h = harness();
    h.l1.seed(turn("s1", 1, "I really prefer green tea in the morning"));
    for seq in 2..=10 {
        h.l1.seed(turn("s1", seq, "ok sounds good"));
    }
    h.mock.set_failing(true);
    h.clock.set(base_time() + Duration::minutes(11));

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.fallback_batches, 1);
    let facts = h.l2.all();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].fact_type, FactType::Preference);
    assert_eq!(facts[0].extraction, ProcessingPath::Fallback);
    assert!((facts[0].certainty - 0.75).abs() < 1e-9);
    assert!(h.l1.all().iter().all(|t| t.processed));
}

#[tokio::test]
async fn malformed_output_falls_back() {
    let h = harness();
    h.l1.seed(turn("s1", 1, "I can't eat peanuts"));
    for seq in 2..=10 {
        h.l1.seed(turn("s1", seq, "fine"));
    }
    h.mock
        .set_default(TaskType::TopicSegmentation, json!({ "facts": "not a list" }));
    h.clock.set(base_time() + Duration::minutes(11));

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.fallback_batches, 1);
    assert_eq!(h.l2.all()[0].fact_type, FactType::Constraint);
}

#[tokio::test]
async fn failed_fact_write_is_retried_next_cycle() {
    let h = harness();
    seed_turns(&h, "s1", 10);
    h.mock.set_default(TaskType::TopicSegmentation, one_fact(1, 2, 0.9));
    h.clock.set(base_time() + Duration::minutes(11));
    h.l2.fail_next_writes(1);

    let first = h.engine.run_cycle().await.unwrap();
    assert_eq!(first.pending_fact_writes, 1);
    assert!(first.errors >= 1);
    assert!(h.l2.is_empty());
    assert!(h.l1.all().iter().all(|t| t.processed));

    let second = h.engine.run_cycle().await.unwrap();
    assert_eq!(second.facts_retried, 1);
    assert_eq!(second.pending_fact_writes, 0);
    assert_eq!(h.l2.len(), 1);
    assert_eq!(h.sink.count("fact_promoted"), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Retention and lifecycle
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn processed_turns_expire_after_ttl() {
    let h = harness();
    seed_turns(&h, "s1", 10);
    h.mock.set_default(TaskType::TopicSegmentation, json!({ "facts": [] }));
    h.clock.set(base_time() + Duration::minutes(11));
    h.engine.run_cycle().await.unwrap();

    h.clock.advance(Duration::hours(25));
    h.l1.seed(turn_at("s2", 1, TurnRole::User, "still waiting", h.clock.now()));
    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.turns_evicted, 10);
    // Unprocessed turns are never evicted.
    assert_eq!(h.l1.len(), 1);
    assert!(h.l1.contains(&TurnRecord::compute_id("s2", 1)));
}

#[tokio::test]
async fn ingested_turns_flow_through_a_cycle() {
    let h = harness();
    h.mock.set_default(TaskType::TopicSegmentation, one_fact(1, 10, 0.95));
    for seq in 1..=10 {
        ingest_turn(
            &*h.l1,
            &*h.clock,
            "s1",
            seq,
            TurnRole::User,
            "we will fly to Kyoto",
        )
        .await
        .unwrap();
    }
    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.facts_promoted, 1);
    assert_eq!(h.l2.all()[0].source_turn_ids.len(), 10);
}

#[tokio::test]
async fn disabled_engine_skips() {
    let mut config = test_config();
    config.promotion.enabled = false;
    let h = harness_with(config);
    seed_turns(&h, "s1", 10);
    let summary = h.engine.tick().await.unwrap();
    assert!(summary.skipped);
    assert_eq!(h.l1.write_count(), 0);
}

#[tokio::test]
async fn cycles_after_shutdown_are_skipped() {
    let h = harness();
    seed_turns(&h, "s1", 10);
    h.engine.shutdown().await.unwrap();
    let report = h.engine.run_cycle().await.unwrap();
    assert!(report.skipped);
    assert_eq!(h.mock.total_calls(), 0);
}

#[tokio::test]
async fn stats_accumulate_across_cycles() {
    let h = harness();
    h.mock.set_default(TaskType::TopicSegmentation, one_fact(1, 1, 0.9));
    h.clock.set(base_time() + Duration::minutes(30));
    seed_turns(&h, "s1", 10);
    h.engine.run_cycle().await.unwrap();
    seed_turns(&h, "s2", 10);
    h.engine.run_cycle().await.unwrap();

    let totals = h.engine.stats();
    assert_eq!(totals.cycles, 2);
    assert_eq!(totals.turns_processed, 20);
    assert_eq!(totals.facts_promoted, 2);
    assert_eq!(h.l2.len(), 2);
}
