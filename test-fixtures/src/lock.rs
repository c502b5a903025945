//! In-memory lease lock with fencing tokens, expiring on an injected clock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use strata_core::errors::{LockError, StrataResult};
use strata_core::traits::{IDistributedLock, LockLease};
use strata_core::Clock;

pub struct InMemoryLock {
    clock: Arc<dyn Clock>,
    leases: DashMap<String, LockLease>,
    next_token: AtomicU64,
    fail_renewals: AtomicBool,
    hang: AtomicBool,
    renewals: AtomicU64,
}

impl InMemoryLock {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            leases: DashMap::new(),
            next_token: AtomicU64::new(1),
            fail_renewals: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            renewals: AtomicU64::new(0),
        })
    }

    pub fn set_fail_renewals(&self, fail: bool) {
        self.fail_renewals.store(fail, Ordering::SeqCst);
    }

    /// Make renew and release calls never answer.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    async fn maybe_hang(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    pub fn renewals(&self) -> u64 {
        self.renewals.load(Ordering::SeqCst)
    }

    pub fn holder(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.leases
            .get(key)
            .filter(|l| l.expires_at > now)
            .map(|l| l.holder.clone())
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::milliseconds(ttl.as_millis() as i64)
    }
}

#[async_trait]
impl IDistributedLock for InMemoryLock {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> StrataResult<Option<LockLease>> {
        let now = self.clock.now();
        let grant = || LockLease {
            key: key.to_string(),
            holder: holder.to_string(),
            fencing_token: self.next_token.fetch_add(1, Ordering::SeqCst),
            expires_at: self.expiry(ttl),
        };
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut current) => {
                if current.get().expires_at > now && current.get().holder != holder {
                    return Ok(None);
                }
                let lease = grant();
                current.insert(lease.clone());
                Ok(Some(lease))
            }
            Entry::Vacant(slot) => {
                let lease = grant();
                slot.insert(lease.clone());
                Ok(Some(lease))
            }
        }
    }

    async fn renew(&self, lease: &LockLease, ttl: Duration) -> StrataResult<LockLease> {
        self.maybe_hang().await;
        if self.fail_renewals.load(Ordering::SeqCst) {
            return Err(LockError::Backend("injected renewal failure".into()).into());
        }
        let now = self.clock.now();
        let mut current = self
            .leases
            .get_mut(&lease.key)
            .ok_or_else(|| LockError::Expired {
                key: lease.key.clone(),
            })?;
        if current.fencing_token != lease.fencing_token {
            return Err(LockError::NotHolder {
                key: lease.key.clone(),
                holder: lease.holder.clone(),
            }
            .into());
        }
        if current.expires_at <= now {
            return Err(LockError::Expired {
                key: lease.key.clone(),
            }
            .into());
        }
        current.expires_at = self.expiry(ttl);
        self.renewals.fetch_add(1, Ordering::SeqCst);
        Ok(current.clone())
    }

    async fn release(&self, lease: &LockLease) -> StrataResult<bool> {
        self.maybe_hang().await;
        Ok(self
            .leases
            .remove_if(&lease.key, |_, current| {
                current.fencing_token == lease.fencing_token
            })
            .is_some())
    }
}
