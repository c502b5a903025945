//! KnowledgeSynthesizer: the query-time read path over L4.
//!
//! 1. Metadata-first filter (timed against `filter_latency_budget_ms`)
//! 2. Near-duplicate grouping by embedding similarity
//! 3. Conflict detection over metadata
//! 4. One generation call over every candidate, or a deterministic merge
//! 5. Cache generated answers by (query, filter) for `cache_ttl_secs`

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use strata_core::config::{DomainSchema, StrataConfig, SynthesisConfig};
use strata_core::errors::{StrataError, StrataResult};
use strata_core::models::{
    normalize_key, DocumentGroup, GenerationRequest, KnowledgeConflict, KnowledgeDocument,
    LifecycleEvent, ProcessingPath, SynthesisQuery, SynthesisResult, TaskType,
};
use strata_core::traits::{ITelemetrySink, ITierStore};
use strata_core::{Clock, RecordFilter, SortOrder, TimedTierStore};
use strata_resilience::ResilientGenerator;

use crate::cache::{cache_key, SynthesisCache};
use crate::conflicts::{conflict_fields, detect_conflicts};
use crate::grouping::group_near_duplicates;
use crate::output::{synthesis_schema, SynthesisOutput};

#[derive(Debug, Default)]
pub struct SynthesisStats {
    queries: AtomicU64,
    cache_hits: AtomicU64,
    generated: AtomicU64,
    fallbacks: AtomicU64,
    filter_over_budget: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SynthesisTotals {
    pub queries: u64,
    pub cache_hits: u64,
    pub generated: u64,
    pub fallbacks: u64,
    /// Filter stages that ran past the latency budget.
    pub filter_over_budget: u64,
}

impl SynthesisStats {
    pub fn snapshot(&self) -> SynthesisTotals {
        SynthesisTotals {
            queries: self.queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            filter_over_budget: self.filter_over_budget.load(Ordering::Relaxed),
        }
    }
}

pub struct KnowledgeSynthesizer {
    knowledge: TimedTierStore<KnowledgeDocument>,
    generator: Arc<ResilientGenerator>,
    config: SynthesisConfig,
    schema: DomainSchema,
    cache: SynthesisCache,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn ITelemetrySink>,
    stats: SynthesisStats,
}

impl KnowledgeSynthesizer {
    pub fn new(
        knowledge: Arc<dyn ITierStore<KnowledgeDocument>>,
        generator: Arc<ResilientGenerator>,
        config: &StrataConfig,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn ITelemetrySink>,
    ) -> StrataResult<Self> {
        config.synthesis.validate()?;
        config.distillation.domain.validate()?;
        let synthesis = config.synthesis.clone();
        let cache = SynthesisCache::new(
            synthesis.cache_max_entries,
            Duration::from_secs(synthesis.cache_ttl_secs),
            clock.clone(),
        );
        Ok(Self {
            knowledge: TimedTierStore::new(
                knowledge,
                Duration::from_millis(config.resilience.timeouts.storage_ms),
            ),
            generator,
            config: synthesis,
            schema: config.distillation.domain.clone(),
            cache,
            clock,
            telemetry,
            stats: SynthesisStats::default(),
        })
    }

    pub fn stats(&self) -> SynthesisTotals {
        self.stats.snapshot()
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Drop every cached result, e.g. after a distillation cycle.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub async fn synthesize(&self, query: &SynthesisQuery) -> StrataResult<SynthesisResult> {
        if query.query.trim().is_empty() {
            return Err(StrataError::ValidationError("synthesis query is empty".into()));
        }
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let key = cache_key(query);
        if let Some(mut cached) = self.cache.get(&key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            cached.cache_hit = true;
            debug!(query_id = %cached.query_id, "synthesis served from cache");
            self.emit(&cached);
            return Ok(cached);
        }

        let candidates = self.filter_candidates(query).await?;
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::seconds(self.config.cache_ttl_secs as i64);
        let query_id = uuid::Uuid::new_v4().to_string();

        if candidates.is_empty() {
            let result = SynthesisResult {
                query_id,
                synthesized_text: format!("No knowledge matches \"{}\".", query.query.trim()),
                source_documents: Vec::new(),
                groups: Vec::new(),
                conflicts: Vec::new(),
                cache_hit: false,
                path: ProcessingPath::Fallback,
                created_at: now,
                expires_at,
            };
            self.emit(&result);
            return Ok(result);
        }

        let groups = group_near_duplicates(&candidates, self.config.similarity_threshold);
        let fields = conflict_fields(&self.schema.conflict_fields(), &candidates, &query.metadata_filter);
        let conflicts = detect_conflicts(&candidates, &fields);

        let (synthesized_text, path) = match self.generate_answer(query, &candidates, &groups, &conflicts).await {
            Ok(answer) => {
                self.stats.generated.fetch_add(1, Ordering::Relaxed);
                (answer, ProcessingPath::Generated)
            }
            Err(e) => {
                warn!(error = %e, candidates = candidates.len(), "synthesis degraded, merging deterministically");
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                (merge_fallback(&candidates, &groups, &conflicts), ProcessingPath::Fallback)
            }
        };

        let result = SynthesisResult {
            query_id,
            synthesized_text,
            source_documents: candidates.iter().map(|d| d.id.clone()).collect(),
            groups,
            conflicts,
            cache_hit: false,
            path,
            created_at: now,
            expires_at,
        };
        info!(
            query_id = %result.query_id,
            sources = result.source_documents.len(),
            groups = result.groups.len(),
            conflicts = result.conflicts.len(),
            path = ?result.path,
            "knowledge synthesized"
        );
        // Degraded answers are not pinned for the TTL.
        if result.path == ProcessingPath::Generated {
            self.cache.insert(key, result.clone());
        }
        self.emit(&result);
        Ok(result)
    }

    /// Structured metadata match, before any similarity work.
    async fn filter_candidates(&self, query: &SynthesisQuery) -> StrataResult<Vec<KnowledgeDocument>> {
        let mut filter = RecordFilter::all();
        for (field, value) in &query.metadata_filter {
            filter = filter.eq(format!("metadata.{field}"), value.clone());
        }
        if !query.document_types.is_empty() {
            let types: Vec<Value> = query
                .document_types
                .iter()
                .map(|t| Value::from(t.as_str()))
                .collect();
            filter = filter.in_values("document_type", types);
        }
        if let Some(topic) = &query.topic_key {
            filter = filter.eq("topic_key", normalize_key(topic));
        }

        let started = Instant::now();
        let candidates = self
            .knowledge
            .query(&filter, self.config.max_candidates, &SortOrder::desc("created_at"))
            .await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.config.filter_latency_budget_ms {
            self.stats.filter_over_budget.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms,
                budget_ms = self.config.filter_latency_budget_ms,
                candidates = candidates.len(),
                "metadata filter over latency budget"
            );
        } else {
            debug!(elapsed_ms, candidates = candidates.len(), "metadata filter complete");
        }
        Ok(candidates)
    }

    async fn generate_answer(
        &self,
        query: &SynthesisQuery,
        candidates: &[KnowledgeDocument],
        groups: &[DocumentGroup],
        conflicts: &[KnowledgeConflict],
    ) -> StrataResult<String> {
        let ids: HashSet<&str> = candidates.iter().map(|d| d.id.as_str()).collect();
        let request = GenerationRequest::new(
            TaskType::KnowledgeSynthesis,
            render_prompt(query, candidates, groups, conflicts),
        )
        .with_schema(synthesis_schema())
        .with_max_output_tokens(1_024);
        let out = self
            .generator
            .generate_validated::<SynthesisOutput, _>(&request, |out| out.validate(&ids))
            .await?;
        Ok(out.answer.trim().to_string())
    }

    fn emit(&self, result: &SynthesisResult) {
        self.telemetry.emit(&LifecycleEvent::KnowledgeSynthesized {
            query_id: result.query_id.clone(),
            source_documents: result.source_documents.clone(),
            conflicts: result.conflicts.len(),
            cache_hit: result.cache_hit,
        });
    }
}

fn render_prompt(
    query: &SynthesisQuery,
    candidates: &[KnowledgeDocument],
    groups: &[DocumentGroup],
    conflicts: &[KnowledgeConflict],
) -> String {
    let mut prompt = format!(
        "Answer the question from the knowledge documents below. Cite the ids you rely on. \
         Where documents conflict, present every side.\n\nQuestion: {}\n\nDocuments:\n",
        query.query.trim()
    );
    for doc in candidates {
        prompt.push_str(&format!(
            "- [{}] ({}, {}) {}\n",
            doc.id,
            doc.document_type.as_str(),
            doc.topic_key,
            doc.content
        ));
    }
    let duplicates: Vec<&DocumentGroup> = groups.iter().filter(|g| g.member_ids.len() > 1).collect();
    if !duplicates.is_empty() {
        prompt.push_str("\nNear-duplicates:\n");
        for group in duplicates {
            prompt.push_str(&format!("- {}\n", group.member_ids.join(", ")));
        }
    }
    if !conflicts.is_empty() {
        prompt.push_str("\nConflicts:\n");
        for conflict in conflicts {
            prompt.push_str(&format!("- {}: {}\n", conflict.field, describe_values(conflict)));
        }
    }
    prompt
}

/// Representatives in group order, then every conflict spelled out.
fn merge_fallback(
    candidates: &[KnowledgeDocument],
    groups: &[DocumentGroup],
    conflicts: &[KnowledgeConflict],
) -> String {
    let mut lines = Vec::with_capacity(groups.len() + conflicts.len());
    for group in groups {
        let Some(doc) = candidates.iter().find(|d| d.id == group.representative_id) else {
            continue;
        };
        let mut line = format!("[{}] {}", doc.id, doc.content.trim());
        if group.member_ids.len() > 1 {
            line.push_str(&format!(" (also {})", group.member_ids.len() - 1));
        }
        lines.push(line);
    }
    for conflict in conflicts {
        lines.push(format!("Conflict on {}: {}", conflict.field, describe_values(conflict)));
    }
    lines.join("\n")
}

fn describe_values(conflict: &KnowledgeConflict) -> String {
    conflict
        .values
        .iter()
        .map(|v| format!("{} says {}", v.document_id, v.value))
        .collect::<Vec<_>>()
        .join("; ")
}
