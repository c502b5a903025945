//! ConsolidationEngine: L2 facts → L3 episodes.
//!
//! Cycle order:
//! 1. Replay queued repairs (missing index sides only, never re-narrated)
//! 2. Recover facts bound to an episode the queue does not know about
//! 3. Cluster each session's free facts and write ready clusters
//! 4. Evict consolidated facts past the L2 TTL

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use strata_core::config::{ConsolidationConfig, LockConfig, StrataConfig};
use strata_core::errors::{
    ConsolidationError, EmbeddingError, ErrorChain, LockError, StrataError, StrataResult,
};
use strata_core::models::{Episode, Fact, IndexSide, LifecycleEvent, ProcessingPath, WriteStatus};
use strata_core::traits::{
    CycleSummary, IDistributedLock, IEmbeddingProvider, ILifecycleEngine, ITelemetrySink,
    ITierStore,
};
use strata_core::vector::validate_dimensions;
use strata_core::{Clock, RecordFilter, SortOrder, TimedTierStore};
use strata_resilience::{LeaseKeeper, ResilientGenerator};

use crate::clusterer::{EpisodeClusterer, FactCluster};
use crate::narrator::EpisodeNarrator;
use crate::repair::{RepairCheckpoint, RepairQueue};

/// The three stores consolidation touches.
pub struct ConsolidationStores {
    pub facts: Arc<dyn ITierStore<Fact>>,
    pub similarity: Arc<dyn ITierStore<Episode>>,
    pub relationship: Arc<dyn ITierStore<Episode>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationCycleReport {
    pub facts_scanned: usize,
    pub sessions: usize,
    /// Sessions skipped because another process holds their lock.
    pub sessions_contended: usize,
    pub clusters_ready: usize,
    pub facts_deferred: usize,
    pub episodes_committed: usize,
    pub episodes_partial: usize,
    pub fallback_narrations: usize,
    pub repairs_attempted: usize,
    pub repairs_completed: usize,
    pub orphans_recovered: usize,
    pub facts_evicted: usize,
    pub pending_repairs: usize,
    pub errors: usize,
    pub duration_ms: u64,
    pub skipped: bool,
}

impl ConsolidationCycleReport {
    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            engine: "consolidation".into(),
            processed: self.facts_scanned,
            written: self.episodes_committed + self.repairs_completed,
            deferred: self.facts_deferred + self.pending_repairs,
            errors: self.errors,
            duration_ms: self.duration_ms,
            skipped: self.skipped,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsolidationStats {
    cycles: AtomicU64,
    episodes_committed: AtomicU64,
    episodes_partial: AtomicU64,
    repairs_completed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationTotals {
    pub cycles: u64,
    pub episodes_committed: u64,
    pub episodes_partial: u64,
    pub repairs_completed: u64,
}

impl ConsolidationStats {
    fn record(&self, report: &ConsolidationCycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.episodes_committed
            .fetch_add(report.episodes_committed as u64, Ordering::Relaxed);
        self.episodes_partial
            .fetch_add(report.episodes_partial as u64, Ordering::Relaxed);
        self.repairs_completed
            .fetch_add(report.repairs_completed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsolidationTotals {
        ConsolidationTotals {
            cycles: self.cycles.load(Ordering::Relaxed),
            episodes_committed: self.episodes_committed.load(Ordering::Relaxed),
            episodes_partial: self.episodes_partial.load(Ordering::Relaxed),
            repairs_completed: self.repairs_completed.load(Ordering::Relaxed),
        }
    }
}

enum SessionLease {
    Unlocked,
    Held(LeaseKeeper),
    Contended,
}

impl SessionLease {
    fn is_lost(&self) -> bool {
        matches!(self, Self::Held(keeper) if keeper.is_lost())
    }
}

pub struct ConsolidationEngine {
    facts: TimedTierStore<Fact>,
    similarity: TimedTierStore<Episode>,
    relationship: TimedTierStore<Episode>,
    embedder: Arc<dyn IEmbeddingProvider>,
    dimensions: usize,
    embedding_timeout: Duration,
    narrator: EpisodeNarrator,
    clusterer: EpisodeClusterer,
    repairs: RepairQueue,
    lock: Option<Arc<dyn IDistributedLock>>,
    lock_config: LockConfig,
    lock_timeout: Duration,
    holder_id: String,
    config: ConsolidationConfig,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn ITelemetrySink>,
    cycle_guard: tokio::sync::Mutex<()>,
    stats: ConsolidationStats,
    shutting_down: AtomicBool,
}

impl ConsolidationEngine {
    /// Fails when the embedding dimension is unset or disagrees with the
    /// provider, or the consolidation section is invalid.
    pub fn new(
        stores: ConsolidationStores,
        generator: Arc<ResilientGenerator>,
        embedder: Arc<dyn IEmbeddingProvider>,
        config: &StrataConfig,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn ITelemetrySink>,
    ) -> StrataResult<Self> {
        config.consolidation.validate()?;
        config.lock.validate()?;
        let dimensions = config.embedding.required_dimensions()?;
        if embedder.dimensions() != dimensions {
            return Err(StrataError::ConfigError(format!(
                "embedding provider {} produces {} dimensions, configured {}",
                embedder.name(),
                embedder.dimensions(),
                dimensions
            )));
        }

        let timeouts = &config.resilience.timeouts;
        let storage_timeout = Duration::from_millis(timeouts.storage_ms);
        Ok(Self {
            facts: TimedTierStore::new(stores.facts, storage_timeout),
            similarity: TimedTierStore::new(stores.similarity, storage_timeout),
            relationship: TimedTierStore::new(stores.relationship, storage_timeout),
            embedder,
            dimensions,
            embedding_timeout: Duration::from_millis(timeouts.embedding_ms),
            narrator: EpisodeNarrator::new(generator),
            clusterer: EpisodeClusterer::new(&config.consolidation),
            repairs: RepairQueue::new(config.consolidation.max_repair_attempts),
            lock: None,
            lock_config: config.lock.clone(),
            lock_timeout: Duration::from_millis(timeouts.lock_ms),
            holder_id: format!("consolidation-{}", uuid::Uuid::new_v4()),
            config: config.consolidation.clone(),
            clock,
            telemetry,
            cycle_guard: tokio::sync::Mutex::new(()),
            stats: ConsolidationStats::default(),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Guard relationship-index writes with a per-session lease.
    pub fn with_lock(mut self, lock: Arc<dyn IDistributedLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn repairs(&self) -> &RepairQueue {
        &self.repairs
    }

    pub fn stats(&self) -> ConsolidationTotals {
        self.stats.snapshot()
    }

    pub fn checkpoint(&self) -> RepairCheckpoint {
        self.repairs.checkpoint(self.clock.now())
    }

    pub fn restore(&self, checkpoint: RepairCheckpoint) -> usize {
        self.repairs.restore(checkpoint)
    }

    pub async fn run_cycle(&self) -> StrataResult<ConsolidationCycleReport> {
        let started = Instant::now();
        let mut report = ConsolidationCycleReport::default();
        if !self.config.enabled || self.shutting_down.load(Ordering::SeqCst) {
            report.skipped = true;
            return Ok(report);
        }

        let _cycle = self.cycle_guard.lock().await;
        let now = self.clock.now();
        let mut errors = ErrorChain::new();

        self.replay_repairs(&mut report, &mut errors).await;
        self.recover_orphans(now, &mut report, &mut errors).await;

        let free = self.free_facts().await?;
        report.facts_scanned = free.len();
        let mut by_session: BTreeMap<String, Vec<Fact>> = BTreeMap::new();
        for fact in free {
            by_session.entry(fact.session_id.clone()).or_default().push(fact);
        }
        report.sessions = by_session.len();

        for (session_id, facts) in by_session {
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            self.consolidate_session(&session_id, facts, now, &mut report, &mut errors)
                .await;
        }

        report.facts_evicted = self.evict_expired_facts(now, &mut errors).await;

        errors.log_summary("consolidation");
        report.errors = errors.len();
        report.pending_repairs = self.repairs.len();
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.stats.record(&report);

        info!(
            facts = report.facts_scanned,
            clusters = report.clusters_ready,
            committed = report.episodes_committed,
            partial = report.episodes_partial,
            repaired = report.repairs_completed,
            pending_repairs = report.pending_repairs,
            deferred_facts = report.facts_deferred,
            duration_ms = report.duration_ms,
            "consolidation cycle complete"
        );
        if let Some(escalated) = errors.into_escalation() {
            return Err(escalated);
        }
        Ok(report)
    }

    /// Unconsolidated facts not bound to any episode.
    async fn free_facts(&self) -> StrataResult<Vec<Fact>> {
        let filter = RecordFilter::all()
            .eq("consolidated", false)
            .is_null("consolidated_episode_id");
        let bound = self.repairs.bound_fact_ids();
        let facts = self
            .facts
            .query(&filter, self.config.fact_scan_limit, &SortOrder::asc("created_at"))
            .await?;
        Ok(facts.into_iter().filter(|f| !bound.contains(&f.id)).collect())
    }

    async fn consolidate_session(
        &self,
        session_id: &str,
        mut facts: Vec<Fact>,
        now: DateTime<Utc>,
        report: &mut ConsolidationCycleReport,
        errors: &mut ErrorChain,
    ) {
        let lease = match self.lease_session(session_id).await {
            Ok(SessionLease::Contended) => {
                report.sessions_contended += 1;
                report.facts_deferred += facts.len();
                return;
            }
            Ok(lease) => lease,
            Err(e) => {
                errors.push(report.clusters_ready, e);
                report.facts_deferred += facts.len();
                return;
            }
        };

        if let Err(e) = self.fill_embeddings(&mut facts).await {
            warn!(session_id, error = %e, "fact embedding failed, session deferred");
            errors.push(report.clusters_ready, e);
            report.facts_deferred += facts.len();
            self.release(lease, errors).await;
            return;
        }

        let plan = self.clusterer.plan(&facts, now);
        report.facts_deferred += plan.deferred.iter().map(FactCluster::len).sum::<usize>();
        for cluster in plan.ready {
            if cluster.is_empty() {
                errors.push(report.clusters_ready, ConsolidationError::EmptyCluster);
                continue;
            }
            report.clusters_ready += 1;
            self.consolidate_cluster(session_id, cluster, &lease, now, report, errors)
                .await;
        }
        self.release(lease, errors).await;
    }

    async fn consolidate_cluster(
        &self,
        session_id: &str,
        cluster: FactCluster,
        lease: &SessionLease,
        now: DateTime<Utc>,
        report: &mut ConsolidationCycleReport,
        errors: &mut ErrorChain,
    ) {
        let narration = self.narrator.narrate(&cluster.facts).await;
        if narration.path == ProcessingPath::Fallback {
            report.fallback_narrations += 1;
        }
        let embedding = match self.embed(&narration.narrative).await {
            Ok(v) => v,
            Err(e) => {
                warn!(session_id, error = %e, "narrative embedding failed, cluster deferred");
                errors.push(report.clusters_ready, e);
                report.facts_deferred += cluster.len();
                return;
            }
        };

        let source_fact_ids = cluster.fact_ids();
        let mut episode = Episode {
            id: Episode::compute_id(session_id, &source_fact_ids),
            session_id: session_id.to_string(),
            window_start: cluster.window_start,
            window_end: cluster.window_end,
            narrative: narration.narrative,
            embedding,
            entities: narration.entities,
            topics: narration.topics,
            source_fact_ids,
            write_status: WriteStatus::Pending,
            narration: narration.path,
            created_at: now,
            committed_at: None,
        };

        let mut last_error = None;
        let mut first_ack = None;
        for side in IndexSide::BOTH {
            match self.write_side(&episode, side, lease, now).await {
                Ok(status) => {
                    first_ack.get_or_insert(side);
                    episode.write_status = status;
                    if status.is_committed() {
                        episode.committed_at = Some(now);
                    }
                }
                Err(e) => {
                    warn!(episode_id = %episode.id, side = %side, error = %e, "episode index write failed");
                    last_error = Some(e.to_string());
                    errors.push(report.clusters_ready, e);
                }
            }
        }

        if episode.write_status.is_committed() {
            // The first copy still reads partial until it is re-stamped.
            if let Some(side) = first_ack {
                if let Err(e) = self.seal_side(&episode, side, lease).await {
                    warn!(episode_id = %episode.id, side = %side, error = %e, "committed status not recorded, queued");
                    report.episodes_partial += 1;
                    if let Err(bind) = self.bind_facts(&episode).await {
                        debug!(episode_id = %episode.id, error = %bind, "binding facts to unsealed episode failed");
                    }
                    self.repairs.enqueue(episode, Some(e.to_string()), now);
                    errors.push(report.clusters_ready, e);
                    return;
                }
            }
            report.episodes_committed += 1;
            self.telemetry.emit(&LifecycleEvent::EpisodeCreated {
                episode_id: episode.id.clone(),
                session_id: session_id.to_string(),
                source_fact_ids: episode.source_fact_ids.clone(),
                path: episode.narration,
            });
            if let Err(e) = self.mark_consolidated(&episode).await {
                // Both sides hold the episode; only the fact update is owed.
                self.repairs.enqueue(episode, Some(e.to_string()), now);
                errors.push(report.clusters_ready, e);
            }
            return;
        }

        report.episodes_partial += 1;
        let pending = episode.write_status.pending_sides();
        let succeeded = match episode.write_status {
            WriteStatus::Partial { succeeded } => Some(succeeded),
            _ => None,
        };
        errors.push(
            report.clusters_ready,
            ConsolidationError::PartialWrite {
                episode_id: episode.id.clone(),
                pending: pending.iter().map(IndexSide::as_str).collect::<Vec<_>>().join(","),
            },
        );
        self.telemetry.emit(&LifecycleEvent::EpisodeWritePartial {
            episode_id: episode.id.clone(),
            succeeded,
            pending,
        });
        self.repairs.enqueue(episode.clone(), last_error, now);
        if let Err(e) = self.bind_facts(&episode).await {
            debug!(episode_id = %episode.id, error = %e, "binding facts to pending episode failed");
        }
    }

    /// Store `episode` on one index, stamped with the status that side's
    /// acknowledgement produces. Returns that status.
    async fn write_side(
        &self,
        episode: &Episode,
        side: IndexSide,
        lease: &SessionLease,
        now: DateTime<Utc>,
    ) -> StrataResult<WriteStatus> {
        let status = episode.write_status.with_ack(side);
        let mut stored = episode.clone();
        stored.write_status = status;
        stored.committed_at = status.is_committed().then_some(now);
        self.store_copy(&stored, side, lease).await?;
        Ok(status)
    }

    /// Re-store a side written before the other one acknowledged. `episode`
    /// carries the commit time.
    async fn seal_side(&self, episode: &Episode, side: IndexSide, lease: &SessionLease) -> StrataResult<()> {
        let mut stored = episode.clone();
        stored.write_status = WriteStatus::Committed;
        self.store_copy(&stored, side, lease).await
    }

    async fn store_copy(&self, stored: &Episode, side: IndexSide, lease: &SessionLease) -> StrataResult<()> {
        match side {
            IndexSide::Similarity => self.similarity.store(stored).await.map(|_| ()),
            IndexSide::Relationship => {
                if lease.is_lost() {
                    return Err(LockError::Expired {
                        key: lock_key(&stored.session_id),
                    }
                    .into());
                }
                self.relationship.store(stored).await.map(|_| ())
            }
        }
    }

    async fn replay_repairs(
        &self,
        report: &mut ConsolidationCycleReport,
        errors: &mut ErrorChain,
    ) {
        for task in self.repairs.snapshot() {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            report.repairs_attempted += 1;
            let episode_id = task.episode.id.clone();
            let pending = task.pending_sides();

            // Sealing touches the relationship side even when it is not pending.
            let lease = match self.lease_session(&task.episode.session_id).await {
                Ok(SessionLease::Contended) => continue,
                Ok(lease) => lease,
                Err(e) => {
                    self.repairs.record_failure(&episode_id, e.to_string());
                    errors.push(0, e);
                    continue;
                }
            };

            let now = self.clock.now();
            let mut episode = task.episode.clone();
            let mut failure = None;
            let mut committed_by = None;
            for side in pending {
                match self.write_side(&episode, side, &lease, now).await {
                    Ok(status) => {
                        if status.is_committed() {
                            committed_by = Some(side);
                        }
                        episode.write_status = status;
                        self.repairs.acknowledge(&episode_id, side);
                    }
                    Err(e) => {
                        failure = Some(e.to_string());
                        errors.push(0, e);
                    }
                }
            }

            if episode.write_status.is_committed() {
                episode.committed_at = Some(now);
                for side in IndexSide::BOTH.into_iter().filter(|s| Some(*s) != committed_by) {
                    if let Err(e) = self.seal_side(&episode, side, &lease).await {
                        failure = Some(e.to_string());
                        errors.push(0, e);
                    }
                }
            }
            self.release(lease, errors).await;

            let Some(current) = self.repairs.get(&episode_id) else {
                continue;
            };
            if !current.episode.write_status.is_committed() || failure.is_some() {
                let reason = failure.unwrap_or_else(|| "index write still pending".into());
                self.repairs.record_failure(&episode_id, reason);
                continue;
            }
            match self.mark_consolidated(&current.episode).await {
                Ok(()) => {
                    self.repairs.complete(&episode_id);
                    report.repairs_completed += 1;
                    info!(episode_id = %episode_id, attempts = current.attempts + 1, "episode repaired");
                    self.telemetry.emit(&LifecycleEvent::EpisodeRepaired {
                        episode_id: episode_id.clone(),
                        source_fact_ids: current.episode.source_fact_ids.clone(),
                        attempts: current.attempts + 1,
                    });
                }
                Err(e) => {
                    self.repairs.record_failure(&episode_id, e.to_string());
                    errors.push(0, e);
                }
            }
        }
    }

    /// Facts bound to an episode that is neither committed nor queued, e.g.
    /// after a restart without a checkpoint.
    async fn recover_orphans(
        &self,
        now: DateTime<Utc>,
        report: &mut ConsolidationCycleReport,
        errors: &mut ErrorChain,
    ) {
        let filter = RecordFilter::all()
            .eq("consolidated", false)
            .not_null("consolidated_episode_id");
        let bound = match self
            .facts
            .query(&filter, self.config.fact_scan_limit, &SortOrder::asc("created_at"))
            .await
        {
            Ok(bound) => bound,
            Err(e) => {
                errors.push(0, e);
                return;
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        for fact in bound {
            let Some(episode_id) = fact.consolidated_episode_id.clone() else {
                continue;
            };
            if self.repairs.contains(&episode_id) || !seen.insert(episode_id.clone()) {
                continue;
            }

            let from_similarity = self.similarity.retrieve(&episode_id).await;
            let from_relationship = self.relationship.retrieve(&episode_id).await;
            let (similarity, relationship) = match (from_similarity, from_relationship) {
                (Ok(s), Ok(r)) => (s, r),
                (Err(e), _) | (_, Err(e)) => {
                    errors.push(0, e);
                    continue;
                }
            };

            let mut status = WriteStatus::Pending;
            if similarity.is_some() {
                status = status.with_ack(IndexSide::Similarity);
            }
            if relationship.is_some() {
                status = status.with_ack(IndexSide::Relationship);
            }
            match similarity.or(relationship) {
                Some(mut episode) => {
                    episode.write_status = status;
                    warn!(episode_id = %episode_id, status = ?status, "recovered orphaned episode into repair queue");
                    self.repairs.enqueue(episode, Some("recovered orphan".into()), now);
                }
                None => {
                    // Neither index has it: free the facts for re-clustering.
                    if let Err(e) = self.unbind_facts(&episode_id).await {
                        errors.push(0, e);
                        continue;
                    }
                    warn!(episode_id = %episode_id, "episode lost before any index write, facts released");
                }
            }
            report.orphans_recovered += 1;
        }
    }

    async fn lease_session(&self, session_id: &str) -> StrataResult<SessionLease> {
        let Some(lock) = self.lock.clone().filter(|_| self.lock_config.enabled) else {
            return Ok(SessionLease::Unlocked);
        };
        let key = lock_key(session_id);
        match LeaseKeeper::acquire(lock, &key, &self.holder_id, &self.lock_config, self.lock_timeout).await? {
            Some(keeper) => Ok(SessionLease::Held(keeper)),
            None => {
                debug!(session_id, "session locked by another consolidator");
                Ok(SessionLease::Contended)
            }
        }
    }

    async fn release(&self, lease: SessionLease, errors: &mut ErrorChain) {
        if let SessionLease::Held(keeper) = lease {
            if let Err(e) = keeper.release().await {
                errors.push(0, e);
            }
        }
    }

    async fn embed(&self, text: &str) -> StrataResult<Vec<f32>> {
        let vector = tokio::time::timeout(self.embedding_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                timeout_ms: self.embedding_timeout.as_millis() as u64,
            })??;
        validate_dimensions(&vector, self.dimensions)?;
        Ok(vector)
    }

    /// Embed fact contents that arrived without a vector.
    async fn fill_embeddings(&self, facts: &mut [Fact]) -> StrataResult<()> {
        let missing: Vec<usize> = facts
            .iter()
            .enumerate()
            .filter(|(_, f)| f.embedding.as_ref().map_or(true, |v| v.len() != self.dimensions))
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = missing.iter().map(|&i| facts[i].content.clone()).collect();
        let vectors = tokio::time::timeout(self.embedding_timeout, self.embedder.embed_batch(&texts))
            .await
            .map_err(|_| EmbeddingError::Timeout {
                timeout_ms: self.embedding_timeout.as_millis() as u64,
            })??;
        if vectors.len() != missing.len() {
            return Err(EmbeddingError::InferenceFailed {
                reason: format!("{} vectors for {} texts", vectors.len(), missing.len()),
            }
            .into());
        }
        for (i, vector) in missing.into_iter().zip(vectors) {
            validate_dimensions(&vector, self.dimensions)?;
            facts[i].embedding = Some(vector);
        }
        Ok(())
    }

    async fn mark_consolidated(&self, episode: &Episode) -> StrataResult<()> {
        self.update_facts(&episode.source_fact_ids, |fact| {
            fact.consolidated = true;
            fact.consolidated_episode_id = Some(episode.id.clone());
        })
        .await
    }

    async fn bind_facts(&self, episode: &Episode) -> StrataResult<()> {
        self.update_facts(&episode.source_fact_ids, |fact| {
            fact.consolidated_episode_id = Some(episode.id.clone());
        })
        .await
    }

    async fn unbind_facts(&self, episode_id: &str) -> StrataResult<()> {
        let filter = RecordFilter::all().eq("consolidated_episode_id", episode_id);
        let facts = self
            .facts
            .query(&filter, self.config.fact_scan_limit, &SortOrder::asc("created_at"))
            .await?;
        let ids: Vec<String> = facts.into_iter().map(|f| f.id).collect();
        self.update_facts(&ids, |fact| fact.consolidated_episode_id = None)
            .await
    }

    /// Read-modify-write each fact. Missing facts (evicted) are skipped.
    async fn update_facts<F>(&self, ids: &[String], apply: F) -> StrataResult<()>
    where
        F: Fn(&mut Fact),
    {
        for id in ids {
            let Some(mut fact) = self.facts.retrieve(id).await? else {
                debug!(fact_id = %id, "fact no longer in L2");
                continue;
            };
            apply(&mut fact);
            self.facts.store(&fact).await?;
        }
        Ok(())
    }

    /// Delete consolidated facts older than the L2 TTL.
    async fn evict_expired_facts(&self, now: DateTime<Utc>, errors: &mut ErrorChain) -> usize {
        let cutoff = now - chrono::Duration::hours(self.config.l2_ttl_hours as i64);
        let filter = RecordFilter::all()
            .eq("consolidated", true)
            .lte("created_at", cutoff.to_rfc3339());
        let expired = match self
            .facts
            .query(&filter, self.config.fact_scan_limit, &SortOrder::asc("created_at"))
            .await
        {
            Ok(expired) => expired,
            Err(e) => {
                errors.push(usize::MAX, e);
                return 0;
            }
        };
        let mut evicted = 0;
        for fact in expired {
            match self.facts.delete(&fact.id).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => errors.push(usize::MAX, e),
            }
        }
        evicted
    }
}

fn lock_key(session_id: &str) -> String {
    format!("consolidation:{session_id}")
}

#[async_trait]
impl ILifecycleEngine for ConsolidationEngine {
    fn name(&self) -> &'static str {
        "consolidation"
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
        let _cycle = self.cycle_guard.lock().await;
        let pending = self.repairs.len();
        if pending > 0 {
            info!(pending, "consolidation stopped with repairs queued for checkpoint");
        } else {
            info!("consolidation engine stopped");
        }
        Ok(())
    }
}
