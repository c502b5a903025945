//! Timeout-guarded access to a tier store.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::{StorageError, StrataResult};
use crate::filter::{RecordFilter, SortOrder};
use crate::traits::{ITierStore, TierRecord};

/// Wraps a tier store so no call can block past `timeout`. A timeout
/// surfaces as [`StorageError::Timeout`].
pub struct TimedTierStore<R: TierRecord> {
    inner: Arc<dyn ITierStore<R>>,
    timeout: Duration,
}

impl<R: TierRecord> Clone for TimedTierStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            timeout: self.timeout,
        }
    }
}

impl<R: TierRecord> TimedTierStore<R> {
    pub fn new(inner: Arc<dyn ITierStore<R>>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &Arc<dyn ITierStore<R>> {
        &self.inner
    }

    async fn guard<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = StrataResult<T>>,
    ) -> StrataResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                tier: self.inner.name().to_string(),
                operation: operation.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    pub async fn store(&self, record: &R) -> StrataResult<String> {
        self.guard("store", self.inner.store(record)).await
    }

    pub async fn retrieve(&self, id: &str) -> StrataResult<Option<R>> {
        self.guard("retrieve", self.inner.retrieve(id)).await
    }

    pub async fn query(
        &self,
        filter: &RecordFilter,
        limit: usize,
        order: &SortOrder,
    ) -> StrataResult<Vec<R>> {
        self.guard("query", self.inner.query(filter, limit, order))
            .await
    }

    pub async fn delete(&self, id: &str) -> StrataResult<bool> {
        self.guard("delete", self.inner.delete(id)).await
    }
}
