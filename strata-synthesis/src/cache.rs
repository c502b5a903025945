//! Short-lived cache of synthesis results.
//! Keyed by a blake3 hash of the canonical (query, filter) pair.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::Serialize;

use strata_core::models::{normalize_key, DocumentType, SynthesisQuery, SynthesisResult};
use strata_core::Clock;

#[derive(Serialize)]
struct CanonicalQuery<'a> {
    query: String,
    metadata_filter: &'a std::collections::BTreeMap<String, serde_json::Value>,
    document_types: Vec<DocumentType>,
    topic_key: Option<String>,
}

/// Cache key for `query`. Whitespace runs in the query text, the order of
/// document types and the case of the topic key do not change it.
pub fn cache_key(query: &SynthesisQuery) -> String {
    let mut document_types = query.document_types.clone();
    document_types.sort();
    document_types.dedup();
    let canonical = CanonicalQuery {
        query: query.query.split_whitespace().collect::<Vec<_>>().join(" "),
        metadata_filter: &query.metadata_filter,
        document_types,
        topic_key: query.topic_key.as_deref().map(normalize_key),
    };
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Moka TTL cache. Entries also expire by their own `expires_at` as seen by
/// the injected clock.
pub struct SynthesisCache {
    inner: Option<Cache<String, SynthesisResult>>,
    clock: Arc<dyn Clock>,
}

impl SynthesisCache {
    /// A zero `ttl` disables caching.
    pub fn new(max_entries: u64, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let inner = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build()
        });
        Self { inner, clock }
    }

    pub fn get(&self, key: &str) -> Option<SynthesisResult> {
        let cache = self.inner.as_ref()?;
        let hit = cache.get(key)?;
        if hit.expires_at <= self.clock.now() {
            cache.invalidate(key);
            return None;
        }
        Some(hit)
    }

    pub fn insert(&self, key: String, result: SynthesisResult) {
        if let Some(cache) = &self.inner {
            cache.insert(key, result);
        }
    }

    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |cache| {
            cache.run_pending_tasks();
            cache.entry_count()
        })
    }
}
