//! DistillationEngine: L3 episodes → L4 knowledge documents.
//!
//! A key (normalized entity or topic) fires once it has `episode_threshold`
//! committed episodes that no stored document for that key cites yet. One
//! generation pass then yields every configured document type; each document
//! cites every contributing episode. Earlier documents for the key are left
//! alone, so a key accumulates documents over time.
//!
//! Each cycle reads one page of newly committed episodes, ordered by commit
//! time, and adds them to a per-key backlog. An episode read while only one
//! copy is committed is checked again each cycle until both copies are.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use strata_core::config::{DistillationConfig, StrataConfig};
use strata_core::errors::{EmbeddingError, ErrorChain, StrataError, StrataResult};
use strata_core::models::{
    stable_id, DocumentType, Episode, GenerationRequest, KnowledgeDocument, LifecycleEvent,
    ProcessingPath, TaskType,
};
use strata_core::traits::{
    CycleSummary, IEmbeddingProvider, ILifecycleEngine, ITelemetrySink, ITierStore,
};
use strata_core::vector::validate_dimensions;
use strata_core::{Clock, RecordFilter, SortOrder, TimedTierStore};
use strata_resilience::ResilientGenerator;

use crate::metadata::{default_metadata, validate_metadata};
use crate::output::{distillation_schema, DistillationOutput};
use crate::scan::ScanCursor;
use crate::templates;

/// The stores distillation reads and writes.
pub struct DistillationStores {
    pub similarity: Arc<dyn ITierStore<Episode>>,
    pub relationship: Arc<dyn ITierStore<Episode>>,
    pub knowledge: Arc<dyn ITierStore<KnowledgeDocument>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistillationCycleReport {
    pub episodes_scanned: usize,
    /// Episodes present in only one index.
    pub uncommitted_skipped: usize,
    pub keys_considered: usize,
    pub keys_distilled: usize,
    /// Keys over the threshold that could not be distilled this cycle.
    pub keys_deferred: usize,
    pub documents_written: usize,
    pub documents_retried: usize,
    pub fallback_passes: usize,
    pub pending_writes: usize,
    pub errors: usize,
    pub duration_ms: u64,
    pub skipped: bool,
}

impl DistillationCycleReport {
    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            engine: "distillation".into(),
            processed: self.episodes_scanned,
            written: self.documents_written + self.documents_retried,
            deferred: self.keys_deferred + self.pending_writes,
            errors: self.errors,
            duration_ms: self.duration_ms,
            skipped: self.skipped,
        }
    }
}

#[derive(Debug, Default)]
pub struct DistillationStats {
    cycles: AtomicU64,
    keys_distilled: AtomicU64,
    documents_written: AtomicU64,
    fallback_passes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DistillationTotals {
    pub cycles: u64,
    pub keys_distilled: u64,
    pub documents_written: u64,
    pub fallback_passes: u64,
}

impl DistillationStats {
    fn record(&self, report: &DistillationCycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.keys_distilled
            .fetch_add(report.keys_distilled as u64, Ordering::Relaxed);
        self.documents_written.fetch_add(
            (report.documents_written + report.documents_retried) as u64,
            Ordering::Relaxed,
        );
        self.fallback_passes
            .fetch_add(report.fallback_passes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DistillationTotals {
        DistillationTotals {
            cycles: self.cycles.load(Ordering::Relaxed),
            keys_distilled: self.keys_distilled.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
            fallback_passes: self.fallback_passes.load(Ordering::Relaxed),
        }
    }
}

/// Where the commit-time scan stands, and the committed episodes each key has
/// not been distilled from yet.
struct ScanState {
    cursor: ScanCursor,
    backlog: BTreeMap<String, BTreeSet<String>>,
    /// Scanned while only one copy read committed; checked again every cycle.
    unconfirmed: BTreeSet<String>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            cursor: ScanCursor::new("committed_at"),
            backlog: BTreeMap::new(),
            unconfirmed: BTreeSet::new(),
        }
    }
}

/// Documents produced for one key, before storage.
struct DistilledKey {
    documents: Vec<KnowledgeDocument>,
    path: ProcessingPath,
}

pub struct DistillationEngine {
    similarity: TimedTierStore<Episode>,
    relationship: TimedTierStore<Episode>,
    knowledge: TimedTierStore<KnowledgeDocument>,
    generator: Arc<ResilientGenerator>,
    embedder: Arc<dyn IEmbeddingProvider>,
    dimensions: usize,
    embedding_timeout: Duration,
    config: DistillationConfig,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn ITelemetrySink>,
    cycle_guard: tokio::sync::Mutex<ScanState>,
    /// Built documents whose store failed, keyed by id. Retried first.
    pending_writes: Mutex<BTreeMap<String, KnowledgeDocument>>,
    stats: DistillationStats,
    shutting_down: AtomicBool,
}

impl DistillationEngine {
    pub fn new(
        stores: DistillationStores,
        generator: Arc<ResilientGenerator>,
        embedder: Arc<dyn IEmbeddingProvider>,
        config: &StrataConfig,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn ITelemetrySink>,
    ) -> StrataResult<Self> {
        config.distillation.validate()?;
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
            similarity: TimedTierStore::new(stores.similarity, storage_timeout),
            relationship: TimedTierStore::new(stores.relationship, storage_timeout),
            knowledge: TimedTierStore::new(stores.knowledge, storage_timeout),
            generator,
            embedder,
            dimensions,
            embedding_timeout: Duration::from_millis(timeouts.embedding_ms),
            config: config.distillation.clone(),
            clock,
            telemetry,
            cycle_guard: tokio::sync::Mutex::new(ScanState::default()),
            pending_writes: Mutex::new(BTreeMap::new()),
            stats: DistillationStats::default(),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn stats(&self) -> DistillationTotals {
        self.stats.snapshot()
    }

    pub fn pending_writes(&self) -> usize {
        self.pending_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub async fn run_cycle(&self) -> StrataResult<DistillationCycleReport> {
        let started = Instant::now();
        let mut report = DistillationCycleReport::default();
        if !self.config.enabled || self.shutting_down.load(Ordering::SeqCst) {
            report.skipped = true;
            return Ok(report);
        }

        let mut scan = self.cycle_guard.lock().await;
        let now = self.clock.now();
        let mut errors = ErrorChain::new();

        self.retry_pending_writes(&mut report, &mut errors).await;
        self.scan_committed(&mut scan, &mut report).await?;
        report.keys_considered = scan.backlog.len();

        let threshold = self.config.episode_threshold;
        let ready: Vec<String> = scan
            .backlog
            .iter()
            .filter(|(_, ids)| ids.len() >= threshold)
            .map(|(key, _)| key.clone())
            .collect();

        for (step, key) in ready.into_iter().enumerate() {
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            let episodes = match self.uncovered_episodes(&key, &mut scan.backlog).await {
                Ok(episodes) => episodes,
                Err(e) => {
                    errors.push(step, e);
                    continue;
                }
            };
            if scan.backlog.get(&key).is_some_and(BTreeSet::is_empty) {
                scan.backlog.remove(&key);
            }
            if episodes.len() < threshold {
                debug!(key = %key, uncovered = episodes.len(), threshold, "key below threshold");
                continue;
            }

            match self.distill_key(&key, &episodes, now).await {
                Ok(distilled) => {
                    if let Some(ids) = scan.backlog.get_mut(&key) {
                        for episode in &episodes {
                            ids.remove(&episode.id);
                        }
                        if ids.is_empty() {
                            scan.backlog.remove(&key);
                        }
                    }
                    if distilled.path == ProcessingPath::Fallback {
                        report.fallback_passes += 1;
                    }
                    report.keys_distilled += 1;
                    for doc in distilled.documents {
                        match self.knowledge.store(&doc).await {
                            Ok(_) => {
                                report.documents_written += 1;
                                self.emit_distilled(&doc);
                            }
                            Err(e) => {
                                warn!(knowledge_id = %doc.id, error = %e, "knowledge write failed, buffered for retry");
                                errors.push(step, e);
                                self.buffer(doc);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "distillation deferred");
                    report.keys_deferred += 1;
                    errors.push(step, e);
                }
            }
        }

        errors.log_summary("distillation");
        report.errors = errors.len();
        report.pending_writes = self.pending_writes();
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.stats.record(&report);

        info!(
            episodes = report.episodes_scanned,
            keys = report.keys_considered,
            distilled = report.keys_distilled,
            documents = report.documents_written,
            fallback = report.fallback_passes,
            deferred = report.keys_deferred,
            duration_ms = report.duration_ms,
            "distillation cycle complete"
        );
        if let Some(escalated) = errors.into_escalation() {
            return Err(escalated);
        }
        Ok(report)
    }

    /// Read the next page of committed episodes, plus any still unconfirmed,
    /// into the backlog. The cursor only moves once both indices have been read.
    async fn scan_committed(&self, scan: &mut ScanState, report: &mut DistillationCycleReport) -> StrataResult<()> {
        let page = self.config.episode_scan_limit;
        let mut cursor = scan.cursor.clone();
        let related = self
            .relationship
            .query(&cursor.filter(RecordFilter::all()), cursor.limit(page), &cursor.order())
            .await?;
        let mut candidates: Vec<Episode> = related
            .into_iter()
            .filter(|e| match e.committed_at {
                Some(at) => cursor.advance(&e.id, at),
                None => false,
            })
            .collect();

        let recheck: Vec<Value> = scan
            .unconfirmed
            .iter()
            .filter(|id| !candidates.iter().any(|e| &e.id == *id))
            .map(|id| Value::from(id.clone()))
            .collect();
        if !recheck.is_empty() {
            let limit = recheck.len();
            let again = self
                .relationship
                .query(&RecordFilter::all().in_values("id", recheck), limit, &SortOrder::asc("id"))
                .await?;
            candidates.extend(again);
        }
        if candidates.is_empty() {
            scan.cursor = cursor;
            scan.unconfirmed.clear();
            return Ok(());
        }

        let ids: Vec<Value> = candidates.iter().map(|e| Value::from(e.id.clone())).collect();
        let indexed: HashSet<String> = self
            .similarity
            .query(&RecordFilter::all().in_values("id", ids), candidates.len(), &SortOrder::asc("id"))
            .await?
            .into_iter()
            .filter(|e| e.write_status.is_committed())
            .map(|e| e.id)
            .collect();

        report.episodes_scanned = candidates.len();
        let mut unconfirmed = BTreeSet::new();
        for episode in &candidates {
            if !(indexed.contains(&episode.id) && episode.write_status.is_committed()) {
                report.uncommitted_skipped += 1;
                unconfirmed.insert(episode.id.clone());
                continue;
            }
            for key in episode.keys() {
                scan.backlog.entry(key).or_default().insert(episode.id.clone());
            }
        }
        debug!(
            scanned = report.episodes_scanned,
            unconfirmed = unconfirmed.len(),
            position = ?cursor.position(),
            "committed episodes scanned"
        );
        scan.cursor = cursor;
        scan.unconfirmed = unconfirmed;
        Ok(())
    }

    /// Backlogged episodes for `key` that no stored or buffered document
    /// cites. Cited or vanished ids leave the backlog.
    async fn uncovered_episodes(
        &self,
        key: &str,
        backlog: &mut BTreeMap<String, BTreeSet<String>>,
    ) -> StrataResult<Vec<Episode>> {
        let covered = self.covered_episode_ids(key).await?;
        let Some(ids) = backlog.get_mut(key) else {
            return Ok(Vec::new());
        };
        ids.retain(|id| !covered.contains(id));
        if ids.len() < self.config.episode_threshold {
            return Ok(Vec::new());
        }

        let wanted: Vec<Value> = ids.iter().map(|id| Value::from(id.clone())).collect();
        let episodes = self
            .relationship
            .query(
                &RecordFilter::all().in_values("id", wanted),
                ids.len(),
                &SortOrder::asc("committed_at"),
            )
            .await?;
        let present: HashSet<&str> = episodes.iter().map(|e| e.id.as_str()).collect();
        ids.retain(|id| present.contains(id.as_str()));
        Ok(episodes)
    }

    /// Episode ids already cited by a stored or buffered document for `key`.
    /// Reads every stored document for the key, a page at a time.
    async fn covered_episode_ids(&self, key: &str) -> StrataResult<HashSet<String>> {
        let page = self.config.episode_scan_limit;
        let mut cursor = ScanCursor::new("created_at");
        let mut covered: HashSet<String> = HashSet::new();
        loop {
            let limit = cursor.limit(page);
            let docs = self
                .knowledge
                .query(&cursor.filter(RecordFilter::all().eq("topic_key", key)), limit, &cursor.order())
                .await?;
            let fetched = docs.len();
            for doc in docs {
                if cursor.advance(&doc.id, doc.created_at) {
                    covered.extend(doc.source_episode_ids);
                }
            }
            if fetched < limit {
                break;
            }
        }
        let pending = self.pending_writes.lock().unwrap_or_else(|e| e.into_inner());
        covered.extend(
            pending
                .values()
                .filter(|d| d.topic_key == key)
                .flat_map(|d| d.source_episode_ids.iter().cloned()),
        );
        Ok(covered)
    }

    async fn distill_key(
        &self,
        key: &str,
        episodes: &[Episode],
        now: DateTime<Utc>,
    ) -> StrataResult<DistilledKey> {
        let types = &self.config.document_types;
        let schema = &self.config.domain;
        let request = GenerationRequest::new(TaskType::KnowledgeDistillation, render_prompt(key, types, episodes))
            .with_schema(distillation_schema(types, schema))
            .with_max_output_tokens(2_048);

        let (drafts, path) = match self
            .generator
            .generate_validated::<DistillationOutput, _>(&request, |out| out.validate(types, schema))
            .await
        {
            Ok(out) => {
                let drafts = out
                    .documents
                    .into_iter()
                    .map(|d| {
                        let metadata = validate_metadata(schema, &d.metadata).map_err(|reason| {
                            StrataError::ValidationError(format!("{key}: {reason}"))
                        })?;
                        Ok((d.document_type, d.content.trim().to_string(), metadata))
                    })
                    .collect::<StrataResult<Vec<_>>>()?;
                (drafts, ProcessingPath::Generated)
            }
            Err(e) => {
                warn!(key, error = %e, "distillation degraded, using templates");
                let metadata = default_metadata(schema)
                    .map_err(|reason| StrataError::ValidationError(format!("{key}: {reason}")))?;
                let drafts = types
                    .iter()
                    .map(|&t| (t, templates::render(t, key, episodes), metadata.clone()))
                    .collect::<Vec<_>>();
                (drafts, ProcessingPath::Fallback)
            }
        };

        let source_episode_ids: Vec<String> = episodes.iter().map(|e| e.id.clone()).collect();
        let mut sorted_ids = source_episode_ids.clone();
        sorted_ids.sort_unstable();

        let contents: Vec<String> = drafts.iter().map(|(_, content, _)| content.clone()).collect();
        let embeddings = self.embed_contents(key, &contents).await;

        // Several documents of one type are told apart by their position.
        let mut seen_per_type: BTreeMap<DocumentType, usize> = BTreeMap::new();
        let documents = drafts
            .into_iter()
            .zip(embeddings)
            .map(|((document_type, content, metadata), embedding)| {
                let ordinal = seen_per_type.entry(document_type).or_insert(0);
                let ordinal_str = ordinal.to_string();
                *ordinal += 1;
                let mut parts = vec![key, document_type.as_str(), ordinal_str.as_str()];
                parts.extend(sorted_ids.iter().map(String::as_str));
                KnowledgeDocument {
                    id: stable_id("kn", &parts),
                    document_type,
                    topic_key: key.to_string(),
                    content,
                    metadata,
                    source_episode_ids: source_episode_ids.clone(),
                    created_at: now,
                    embedding,
                    synthesis: path,
                }
            })
            .collect();
        Ok(DistilledKey { documents, path })
    }

    /// One vector per content, `None` throughout when embedding fails.
    async fn embed_contents(&self, key: &str, contents: &[String]) -> Vec<Option<Vec<f32>>> {
        let result = tokio::time::timeout(self.embedding_timeout, self.embedder.embed_batch(contents))
            .await
            .map_err(|_| {
                StrataError::from(EmbeddingError::Timeout {
                    timeout_ms: self.embedding_timeout.as_millis() as u64,
                })
            })
            .and_then(|r| r)
            .and_then(|vectors| {
                if vectors.len() != contents.len() {
                    return Err(EmbeddingError::InferenceFailed {
                        reason: format!("{} vectors for {} texts", vectors.len(), contents.len()),
                    }
                    .into());
                }
                for v in &vectors {
                    validate_dimensions(v, self.dimensions)?;
                }
                Ok(vectors)
            });
        match result {
            Ok(vectors) => vectors.into_iter().map(Some).collect(),
            Err(e) => {
                warn!(key, error = %e, "knowledge embedding failed, storing without vectors");
                vec![None; contents.len()]
            }
        }
    }

    async fn retry_pending_writes(&self, report: &mut DistillationCycleReport, errors: &mut ErrorChain) {
        let pending: Vec<KnowledgeDocument> = self
            .pending_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for doc in pending {
            match self.knowledge.store(&doc).await {
                Ok(_) => {
                    self.pending_writes
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&doc.id);
                    report.documents_retried += 1;
                    self.emit_distilled(&doc);
                }
                Err(e) => errors.push(0, e),
            }
        }
    }

    fn buffer(&self, doc: KnowledgeDocument) {
        self.pending_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doc.id.clone(), doc);
    }

    fn emit_distilled(&self, doc: &KnowledgeDocument) {
        self.telemetry.emit(&LifecycleEvent::KnowledgeDistilled {
            knowledge_id: doc.id.clone(),
            document_type: doc.document_type,
            topic_key: doc.topic_key.clone(),
            source_episode_ids: doc.source_episode_ids.clone(),
        });
    }
}

fn render_prompt(key: &str, types: &[DocumentType], episodes: &[Episode]) -> String {
    let names: Vec<&str> = types.iter().map(DocumentType::as_str).collect();
    let mut prompt = format!(
        "Distill the episodes below about \"{key}\" into one document of each type: {}. \
         Fill in the metadata fields the schema declares.\n\n",
        names.join(", ")
    );
    for episode in episodes {
        prompt.push_str(&format!(
            "- [{}] {} ({} to {})\n",
            episode.id,
            episode.narrative,
            episode.window_start.to_rfc3339(),
            episode.window_end.to_rfc3339()
        ));
    }
    prompt
}

#[async_trait]
impl ILifecycleEngine for DistillationEngine {
    fn name(&self) -> &'static str {
        "distillation"
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
        let pending = self.pending_writes();
        if pending > 0 {
            warn!(pending, "distillation stopped with unwritten documents");
        } else {
            info!("distillation engine stopped");
        }
        Ok(())
    }
}
