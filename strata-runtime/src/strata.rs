//! Wiring of stores, collaborators and engines into one handle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use strata_consolidation::{ConsolidationEngine, ConsolidationStores, RepairCheckpoint};
use strata_core::config::StrataConfig;
use strata_core::errors::{StorageError, StrataResult};
use strata_core::models::{Episode, Fact, KnowledgeDocument, TurnRecord};
use strata_core::traits::{
    IDistributedLock, IEmbeddingProvider, IGenerationProvider, ILifecycleEngine, ITelemetrySink, ITierStore,
    TierRecord, TracingTelemetry,
};
use strata_core::{Clock, RecordFilter, SortOrder, SystemClock, TimedTierStore};
use strata_distillation::{DistillationEngine, DistillationStores};
use strata_promotion::PromotionEngine;
use strata_resilience::ResilientGenerator;
use strata_synthesis::KnowledgeSynthesizer;

/// One store per tier; L3 has both indices.
#[derive(Clone)]
pub struct StrataStores {
    pub turns: Arc<dyn ITierStore<TurnRecord>>,
    pub facts: Arc<dyn ITierStore<Fact>>,
    pub similarity: Arc<dyn ITierStore<Episode>>,
    pub relationship: Arc<dyn ITierStore<Episode>>,
    pub knowledge: Arc<dyn ITierStore<KnowledgeDocument>>,
}

impl StrataStores {
    /// Read at most one record from every store, each under `timeout`.
    pub async fn ping(&self, timeout: Duration) -> StrataResult<()> {
        ping_store(&self.turns, timeout).await?;
        ping_store(&self.facts, timeout).await?;
        ping_store(&self.similarity, timeout).await?;
        ping_store(&self.relationship, timeout).await?;
        ping_store(&self.knowledge, timeout).await
    }
}

async fn ping_store<R: TierRecord>(store: &Arc<dyn ITierStore<R>>, timeout: Duration) -> StrataResult<()> {
    let timed = TimedTierStore::new(store.clone(), timeout);
    match timed.query(&RecordFilter::all(), 1, &SortOrder::asc("id")).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!(tier = store.name(), error = %e, "store unreachable");
            Err(StorageError::Unavailable {
                tier: store.name().to_string(),
                reason: e.to_string(),
            }
            .into())
        }
    }
}

/// External services shared by every engine.
pub struct Collaborators {
    pub generation: Arc<dyn IGenerationProvider>,
    pub embedder: Arc<dyn IEmbeddingProvider>,
    pub lock: Option<Arc<dyn IDistributedLock>>,
    pub clock: Arc<dyn Clock>,
    pub telemetry: Arc<dyn ITelemetrySink>,
}

impl Collaborators {
    /// Wall clock, tracing telemetry and no cross-process lock.
    pub fn new(generation: Arc<dyn IGenerationProvider>, embedder: Arc<dyn IEmbeddingProvider>) -> Self {
        Self {
            generation,
            embedder,
            lock: None,
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    pub fn with_lock(mut self, lock: Arc<dyn IDistributedLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn ITelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

/// The assembled lifecycle: three background engines and the read path.
///
/// Every generation call from every engine goes through the same
/// [`ResilientGenerator`], so one breaker and one rate budget cover the
/// whole process.
pub struct Strata {
    pub config: StrataConfig,
    pub generator: Arc<ResilientGenerator>,
    pub promotion: Arc<PromotionEngine>,
    pub consolidation: Arc<ConsolidationEngine>,
    pub distillation: Arc<DistillationEngine>,
    pub synthesizer: Arc<KnowledgeSynthesizer>,
    pub clock: Arc<dyn Clock>,
}

impl Strata {
    /// Validate `config`, check every store answers and build every engine.
    /// An invalid section or an unreachable store is fatal.
    pub async fn assemble(
        config: StrataConfig,
        stores: StrataStores,
        collaborators: Collaborators,
    ) -> StrataResult<Self> {
        config.validate()?;
        stores
            .ping(Duration::from_millis(config.resilience.timeouts.storage_ms))
            .await?;
        let Collaborators {
            generation,
            embedder,
            lock,
            clock,
            telemetry,
        } = collaborators;

        let generator = Arc::new(ResilientGenerator::from_config(
            generation,
            &config.resilience,
            clock.clone(),
            telemetry.clone(),
        )?);

        let promotion = PromotionEngine::new(
            stores.turns.clone(),
            stores.facts.clone(),
            generator.clone(),
            &config,
            clock.clone(),
            telemetry.clone(),
        )?;

        let mut consolidation = ConsolidationEngine::new(
            ConsolidationStores {
                facts: stores.facts.clone(),
                similarity: stores.similarity.clone(),
                relationship: stores.relationship.clone(),
            },
            generator.clone(),
            embedder.clone(),
            &config,
            clock.clone(),
            telemetry.clone(),
        )?;
        if let Some(lock) = lock {
            consolidation = consolidation.with_lock(lock);
        }

        let distillation = DistillationEngine::new(
            DistillationStores {
                similarity: stores.similarity.clone(),
                relationship: stores.relationship.clone(),
                knowledge: stores.knowledge.clone(),
            },
            generator.clone(),
            embedder,
            &config,
            clock.clone(),
            telemetry.clone(),
        )?;

        let synthesizer = KnowledgeSynthesizer::new(
            stores.knowledge,
            generator.clone(),
            &config,
            clock.clone(),
            telemetry,
        )?;

        info!(
            provider = generator.breaker().name(),
            dimensions = ?config.embedding.dimensions,
            "strata assembled"
        );
        Ok(Self {
            config,
            generator,
            promotion: Arc::new(promotion),
            consolidation: Arc::new(consolidation),
            distillation: Arc::new(distillation),
            synthesizer: Arc::new(synthesizer),
            clock,
        })
    }

    /// The background engines in pipeline order.
    pub fn engines(&self) -> Vec<Arc<dyn ILifecycleEngine>> {
        vec![
            self.promotion.clone(),
            self.consolidation.clone(),
            self.distillation.clone(),
        ]
    }

    /// Re-import repairs checkpointed by a previous shutdown.
    pub fn restore_repairs(&self, checkpoint: RepairCheckpoint) -> usize {
        self.consolidation.restore(checkpoint)
    }
}
