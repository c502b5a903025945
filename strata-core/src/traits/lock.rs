use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StrataResult;

/// A time-bounded grant on a named lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLease {
    pub key: String,
    pub holder: String,
    /// Strictly increases with every grant of the same key.
    pub fencing_token: u64,
    pub expires_at: DateTime<Utc>,
}

/// Cross-process lock with lease expiry as the safety net against crashed
/// holders.
#[async_trait]
pub trait IDistributedLock: Send + Sync {
    /// Grant the lock if it is free or its lease expired. `None` if held.
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> StrataResult<Option<LockLease>>;

    /// Extend a held lease. Fails if the lease was lost.
    async fn renew(&self, lease: &LockLease, ttl: Duration) -> StrataResult<LockLease>;

    /// Release a held lease. Returns false if it had already been lost.
    async fn release(&self, lease: &LockLease) -> StrataResult<bool>;
}
