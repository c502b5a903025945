//! Deterministic bag-of-words embedder. Texts sharing vocabulary land close
//! together; identical word sets produce identical vectors.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use strata_core::errors::{EmbeddingError, StrataResult};
use strata_core::traits::IEmbeddingProvider;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "i", "to", "of", "in", "on", "is", "it", "my", "me", "for", "with",
    "at", "be", "that", "this", "user", "very", "really", "much",
];

pub struct DeterministicEmbedder {
    dimensions: usize,
    /// Emits vectors of this length instead, to exercise dimension checks.
    emitted_dimensions: AtomicUsize,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl DeterministicEmbedder {
    pub fn new(dimensions: usize) -> Arc<Self> {
        Arc::new(Self {
            dimensions,
            emitted_dimensions: AtomicUsize::new(dimensions),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn emit_dimensions(&self, dims: usize) {
        self.emitted_dimensions.store(dims, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Embed synchronously; also used by builders.
    pub fn vector(dimensions: usize, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; dimensions.max(1)];
        let lowered = text.to_lowercase();
        let words = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w));
        for word in words {
            let hash = blake3::hash(word.as_bytes());
            let bytes = hash.as_bytes();
            let idx = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % v.len();
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        } else {
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl IEmbeddingProvider for DeterministicEmbedder {
    async fn embed(&self, text: &str) -> StrataResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::InferenceFailed {
                reason: "injected embedding failure".into(),
            }
            .into());
        }
        Ok(Self::vector(
            self.emitted_dimensions.load(Ordering::SeqCst),
            text,
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "deterministic-bow"
    }
}
