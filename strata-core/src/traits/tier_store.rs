use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StrataResult;
use crate::filter::{RecordFilter, SortOrder};
use crate::models::{Episode, Fact, KnowledgeDocument, Tier, TurnRecord};

/// A record that lives in one tier.
pub trait TierRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TIER: Tier;

    fn record_id(&self) -> &str;
}

impl TierRecord for TurnRecord {
    const TIER: Tier = Tier::L1Working;

    fn record_id(&self) -> &str {
        &self.id
    }
}

impl TierRecord for Fact {
    const TIER: Tier = Tier::L2Facts;

    fn record_id(&self) -> &str {
        &self.id
    }
}

impl TierRecord for Episode {
    const TIER: Tier = Tier::L3Episodes;

    fn record_id(&self) -> &str {
        &self.id
    }
}

impl TierRecord for KnowledgeDocument {
    const TIER: Tier = Tier::L4Knowledge;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Generic per-tier storage contract, satisfied by every backend adapter.
#[async_trait]
pub trait ITierStore<R: TierRecord>: Send + Sync {
    /// Insert or replace by record id. Returns the id.
    async fn store(&self, record: &R) -> StrataResult<String>;

    async fn retrieve(&self, id: &str) -> StrataResult<Option<R>>;

    async fn query(
        &self,
        filter: &RecordFilter,
        limit: usize,
        order: &SortOrder,
    ) -> StrataResult<Vec<R>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> StrataResult<bool>;

    /// Adapter name for logs.
    fn name(&self) -> &str {
        R::TIER.as_str()
    }
}
