//! DashMap-backed tier store with write/read failure injection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use strata_core::errors::{StorageError, StrataResult};
use strata_core::filter::{RecordFilter, SortOrder};
use strata_core::traits::{ITierStore, TierRecord};

pub struct InMemoryTierStore<R: TierRecord> {
    name: String,
    records: DashMap<String, R>,
    fail_next_writes: AtomicUsize,
    pass_before_failing: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_delay_ms: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl<R: TierRecord> Default for InMemoryTierStore<R> {
    fn default() -> Self {
        Self::named(R::TIER.as_str())
    }
}

impl<R: TierRecord> InMemoryTierStore<R> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: DashMap::new(),
            fail_next_writes: AtomicUsize::new(0),
            pass_before_failing: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            write_delay_ms: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` writes, then recover.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next_writes.store(n, Ordering::SeqCst);
    }

    /// Let the next `pass` writes through, then fail `n`.
    pub fn fail_writes_after(&self, pass: usize, n: usize) {
        self.pass_before_failing.store(pass, Ordering::SeqCst);
        self.fail_next_writes.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Delay every write, to exercise caller timeouts.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn all(&self) -> Vec<R> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Insert directly, bypassing failure injection.
    pub fn seed(&self, record: R) {
        self.records.insert(record.record_id().to_string(), record);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn should_fail_write(&self) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return true;
        }
        if self
            .pass_before_failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return false;
        }
        self.fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn read_guard(&self) -> StrataResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed {
                tier: self.name.clone(),
                reason: "injected read failure".into(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl<R: TierRecord> ITierStore<R> for InMemoryTierStore<R> {
    async fn store(&self, record: &R) -> StrataResult<String> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        let id = record.record_id().to_string();
        if self.should_fail_write() {
            return Err(StorageError::WriteFailed {
                tier: self.name.clone(),
                id,
                reason: "injected write failure".into(),
            }
            .into());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records.insert(id.clone(), record.clone());
        Ok(id)
    }

    async fn retrieve(&self, id: &str) -> StrataResult<Option<R>> {
        self.read_guard()?;
        Ok(self.get(id))
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        limit: usize,
        order: &SortOrder,
    ) -> StrataResult<Vec<R>> {
        self.read_guard()?;
        let mut rows: Vec<(serde_json::Value, R)> = self
            .records
            .iter()
            .filter_map(|entry| {
                let value = serde_json::to_value(entry.value()).ok()?;
                filter.matches(&value).then(|| (value, entry.value().clone()))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| order.compare(a, b));
        Ok(rows.into_iter().take(limit).map(|(_, r)| r).collect())
    }

    async fn delete(&self, id: &str) -> StrataResult<bool> {
        if self.should_fail_write() {
            return Err(StorageError::WriteFailed {
                tier: self.name.clone(),
                id: id.to_string(),
                reason: "injected delete failure".into(),
            }
            .into());
        }
        let removed = self.records.remove(id).is_some();
        if removed {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
