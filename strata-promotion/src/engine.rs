//! PromotionEngine: `Idle → Processing(session) → Idle` on a fixed cycle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use strata_core::config::{PromotionConfig, StrataConfig};
use strata_core::errors::{ErrorChain, StrataResult};
use strata_core::models::{Fact, LifecycleEvent, ProcessingPath, TurnRecord};
use strata_core::traits::{CycleSummary, ILifecycleEngine, ITelemetrySink, ITierStore};
use strata_core::{Clock, RecordFilter, SortOrder, TimedTierStore};
use strata_resilience::ResilientGenerator;
use strata_scoring::CiarScorer;

use crate::segmenter::TopicSegmenter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Processing { session_id: String },
}

/// Outcome of one promotion cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionCycleReport {
    pub sessions_seen: usize,
    pub batches: usize,
    pub turns_processed: usize,
    pub turns_deferred: usize,
    pub facts_extracted: usize,
    pub facts_promoted: usize,
    pub facts_rejected: usize,
    /// Facts from earlier cycles whose write succeeded this cycle.
    pub facts_retried: usize,
    /// Facts still waiting for a successful L2 write.
    pub pending_fact_writes: usize,
    pub fallback_batches: usize,
    pub turns_evicted: usize,
    pub errors: usize,
    pub duration_ms: u64,
    pub skipped: bool,
}

impl PromotionCycleReport {
    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            engine: "promotion".into(),
            processed: self.turns_processed,
            written: self.facts_promoted + self.facts_retried,
            deferred: self.turns_deferred + self.pending_fact_writes,
            errors: self.errors,
            duration_ms: self.duration_ms,
            skipped: self.skipped,
        }
    }
}

/// Cumulative counters across cycles.
#[derive(Debug, Default)]
pub struct PromotionStats {
    cycles: AtomicU64,
    turns_processed: AtomicU64,
    facts_promoted: AtomicU64,
    facts_rejected: AtomicU64,
    fallback_batches: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromotionTotals {
    pub cycles: u64,
    pub turns_processed: u64,
    pub facts_promoted: u64,
    pub facts_rejected: u64,
    pub fallback_batches: u64,
}

impl PromotionStats {
    fn record(&self, report: &PromotionCycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.turns_processed
            .fetch_add(report.turns_processed as u64, Ordering::Relaxed);
        self.facts_promoted.fetch_add(
            (report.facts_promoted + report.facts_retried) as u64,
            Ordering::Relaxed,
        );
        self.facts_rejected
            .fetch_add(report.facts_rejected as u64, Ordering::Relaxed);
        self.fallback_batches
            .fetch_add(report.fallback_batches as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PromotionTotals {
        PromotionTotals {
            cycles: self.cycles.load(Ordering::Relaxed),
            turns_processed: self.turns_processed.load(Ordering::Relaxed),
            facts_promoted: self.facts_promoted.load(Ordering::Relaxed),
            facts_rejected: self.facts_rejected.load(Ordering::Relaxed),
            fallback_batches: self.fallback_batches.load(Ordering::Relaxed),
        }
    }
}

pub struct PromotionEngine {
    l1: TimedTierStore<TurnRecord>,
    l2: TimedTierStore<Fact>,
    segmenter: TopicSegmenter,
    scorer: CiarScorer,
    config: PromotionConfig,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn ITelemetrySink>,
    state: Mutex<EngineState>,
    /// Serializes cycles so a session is never drained twice concurrently.
    cycle_guard: tokio::sync::Mutex<()>,
    /// Promoted facts whose L2 write failed, keyed by their idempotent id.
    pending_writes: Mutex<BTreeMap<String, Fact>>,
    stats: PromotionStats,
    shutting_down: AtomicBool,
}

impl PromotionEngine {
    /// Fails on an invalid `promotion` or `ciar` section.
    pub fn new(
        l1: Arc<dyn ITierStore<TurnRecord>>,
        l2: Arc<dyn ITierStore<Fact>>,
        generator: Arc<ResilientGenerator>,
        config: &StrataConfig,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn ITelemetrySink>,
    ) -> StrataResult<Self> {
        config.promotion.validate()?;
        let scorer = CiarScorer::new(config.ciar.clone())?;
        let storage_timeout = Duration::from_millis(config.resilience.timeouts.storage_ms);
        Ok(Self {
            l1: TimedTierStore::new(l1, storage_timeout),
            l2: TimedTierStore::new(l2, storage_timeout),
            segmenter: TopicSegmenter::new(generator, config.promotion.fallback_certainty),
            scorer,
            config: config.promotion.clone(),
            clock,
            telemetry,
            state: Mutex::new(EngineState::Idle),
            cycle_guard: tokio::sync::Mutex::new(()),
            pending_writes: Mutex::new(BTreeMap::new()),
            stats: PromotionStats::default(),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> EngineState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn stats(&self) -> PromotionTotals {
        self.stats.snapshot()
    }

    pub fn pending_writes(&self) -> usize {
        self.pending_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Run one cycle over every session with unprocessed turns.
    pub async fn run_cycle(&self) -> StrataResult<PromotionCycleReport> {
        let started = Instant::now();
        let mut report = PromotionCycleReport::default();
        if !self.config.enabled || self.shutting_down.load(Ordering::SeqCst) {
            report.skipped = true;
            return Ok(report);
        }

        let _cycle = self.cycle_guard.lock().await;
        let now = self.clock.now();
        let mut errors = ErrorChain::new();

        self.retry_pending_writes(&mut report, &mut errors).await;

        let sessions = self.sessions_with_backlog().await?;
        report.sessions_seen = sessions.len();
        for session_id in sessions {
            if self.shutting_down.load(Ordering::SeqCst) {
                debug!("promotion shutting down, leaving remaining sessions");
                break;
            }
            self.set_state(EngineState::Processing {
                session_id: session_id.clone(),
            });
            self.drain_session(&session_id, now, &mut report, &mut errors)
                .await;
        }
        self.set_state(EngineState::Idle);

        report.turns_evicted = self.evict_expired_turns(now, &mut errors).await;

        errors.log_summary("promotion");
        report.errors = errors.len();
        report.pending_fact_writes = self.pending_writes();
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.stats.record(&report);

        info!(
            sessions = report.sessions_seen,
            batches = report.batches,
            turns_processed = report.turns_processed,
            facts_extracted = report.facts_extracted,
            promoted = report.facts_promoted,
            rejected = report.facts_rejected,
            deferred_turns = report.turns_deferred,
            pending_writes = report.pending_fact_writes,
            duration_ms = report.duration_ms,
            "promotion cycle complete"
        );
        if let Some(escalated) = errors.into_escalation() {
            return Err(escalated);
        }
        Ok(report)
    }

    /// Sessions with unprocessed turns, oldest backlog first.
    async fn sessions_with_backlog(&self) -> StrataResult<Vec<String>> {
        let turns = self
            .l1
            .query(
                &RecordFilter::all().eq("processed", false),
                self.config.session_scan_limit,
                &SortOrder::asc("timestamp"),
            )
            .await?;
        let mut sessions: Vec<String> = Vec::new();
        for turn in turns {
            if !sessions.contains(&turn.session_id) {
                sessions.push(turn.session_id);
            }
        }
        Ok(sessions)
    }

    async fn drain_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        report: &mut PromotionCycleReport,
        errors: &mut ErrorChain,
    ) {
        let filter = RecordFilter::all()
            .eq("session_id", session_id)
            .eq("processed", false);
        let max_wait = chrono::Duration::seconds(self.config.max_batch_wait_secs as i64);

        for _ in 0..self.config.max_batches_per_session {
            if self.shutting_down.load(Ordering::SeqCst) {
                debug!(session_id, "promotion shutting down, leaving remaining batches");
                return;
            }
            let batch = match self
                .l1
                .query(&filter, self.config.batch_size, &SortOrder::asc("sequence"))
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    errors.push(report.batches, e);
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }

            if batch.len() < self.config.batch_size {
                let oldest = batch.iter().map(|t| t.timestamp).min().unwrap_or(now);
                if now - oldest < max_wait {
                    debug!(
                        session_id,
                        turns = batch.len(),
                        batch_size = self.config.batch_size,
                        "partial batch still within wait window"
                    );
                    report.turns_deferred += batch.len();
                    return;
                }
            }

            report.batches += 1;
            if !self.promote_batch(session_id, &batch, now, report, errors).await {
                return;
            }
        }
    }

    /// Segment, score and write one batch, then mark every turn processed.
    /// Returns false if the batch could not be fully marked.
    async fn promote_batch(
        &self,
        session_id: &str,
        batch: &[TurnRecord],
        now: DateTime<Utc>,
        report: &mut PromotionCycleReport,
        errors: &mut ErrorChain,
    ) -> bool {
        let segmented = self.segmenter.segment(session_id, batch).await;
        if segmented.path == ProcessingPath::Fallback {
            report.fallback_batches += 1;
        }
        report.facts_extracted += segmented.facts.len();

        let mut promoted = 0;
        let mut rejected = 0;
        for mut fact in segmented.facts {
            fact.ciar_score = self.scorer.score_fact(&fact, now);
            if !self.scorer.should_promote(fact.ciar_score) {
                rejected += 1;
                debug!(session_id, ciar = fact.ciar_score, content = %fact.content, "fact below threshold");
                self.telemetry.emit(&LifecycleEvent::FactRejected {
                    session_id: session_id.to_string(),
                    ciar_score: fact.ciar_score,
                    source_turn_ids: fact.source_turn_ids.clone(),
                });
                continue;
            }
            match self.l2.store(&fact).await {
                Ok(_) => {
                    promoted += 1;
                    self.emit_promoted(&fact);
                }
                Err(e) => {
                    warn!(fact_id = %fact.id, error = %e, "fact write failed, retrying next cycle");
                    errors.push(report.batches, e);
                    self.pending_writes
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(fact.id.clone(), fact);
                }
            }
        }
        report.facts_promoted += promoted;
        report.facts_rejected += rejected;

        let mut marked_all = true;
        for turn in batch {
            match self.l1.store(&turn.mark_processed(now)).await {
                Ok(_) => report.turns_processed += 1,
                Err(e) => {
                    errors.push(report.batches, e);
                    marked_all = false;
                }
            }
        }

        self.telemetry.emit(&LifecycleEvent::BatchPromoted {
            session_id: session_id.to_string(),
            turn_ids: batch.iter().map(|t| t.id.clone()).collect(),
            promoted,
            rejected,
            path: segmented.path,
        });
        marked_all
    }

    fn emit_promoted(&self, fact: &Fact) {
        self.telemetry.emit(&LifecycleEvent::FactPromoted {
            fact_id: fact.id.clone(),
            session_id: fact.session_id.clone(),
            ciar_score: fact.ciar_score,
            source_turn_ids: fact.source_turn_ids.clone(),
        });
    }

    async fn retry_pending_writes(&self, report: &mut PromotionCycleReport, errors: &mut ErrorChain) {
        let pending: Vec<Fact> = self
            .pending_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for fact in pending {
            match self.l2.store(&fact).await {
                Ok(_) => {
                    self.pending_writes
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&fact.id);
                    report.facts_retried += 1;
                    self.emit_promoted(&fact);
                }
                Err(e) => errors.push(0, e),
            }
        }
    }

    /// Delete processed turns older than the L1 TTL. Unprocessed turns stay.
    async fn evict_expired_turns(&self, now: DateTime<Utc>, errors: &mut ErrorChain) -> usize {
        let cutoff = now - chrono::Duration::hours(self.config.l1_ttl_hours as i64);
        let filter = RecordFilter::all()
            .eq("processed", true)
            .lte("timestamp", cutoff.to_rfc3339());
        let expired = match self
            .l1
            .query(&filter, self.config.session_scan_limit, &SortOrder::asc("timestamp"))
            .await
        {
            Ok(expired) => expired,
            Err(e) => {
                errors.push(usize::MAX, e);
                return 0;
            }
        };
        let mut evicted = 0;
        for turn in expired {
            match self.l1.delete(&turn.id).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => errors.push(usize::MAX, e),
            }
        }
        if evicted > 0 {
            debug!(evicted, "expired L1 turns evicted");
        }
        evicted
    }
}

#[async_trait]
impl ILifecycleEngine for PromotionEngine {
    fn name(&self) -> &'static str {
        "promotion"
    }

    fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.config.cycle_interval_secs)
    }

    async fn tick(&self) -> StrataResult<CycleSummary> {
        self.run_cycle().await.map(|r| r.summary())
    }

    fn request_stop(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    async fn shutdown(&self) -> StrataResult<()> {
        self.request_stop();
        // Wait for an in-flight cycle to finish its current batch.
        let _cycle = self.cycle_guard.lock().await;
        let pending = self.pending_writes();
        if pending > 0 {
            warn!(pending, "promotion stopped with fact writes still pending");
        }
        info!("promotion engine stopped");
        Ok(())
    }
}
