//! Holds a distributed lease alive with a background renewal loop.
//!
//! The keeper renews every `renew_interval` until [`LeaseKeeper::release`]
//! is called or the keeper is dropped. Dropping without releasing stops the
//! renewals and leaves expiry to reclaim the lock.
//!
//! Every backend call is bounded by the call timeout. A renewal that does not
//! answer in time counts as a lost lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use strata_core::config::LockConfig;
use strata_core::errors::{LockError, StrataResult};
use strata_core::traits::{IDistributedLock, LockLease};

pub struct LeaseKeeper {
    lock: Arc<dyn IDistributedLock>,
    lease: Arc<Mutex<LockLease>>,
    lost: Arc<AtomicBool>,
    call_timeout: Duration,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl LeaseKeeper {
    /// Try to take `key` for `holder`. `Ok(None)` when another holder has it.
    pub async fn acquire(
        lock: Arc<dyn IDistributedLock>,
        key: &str,
        holder: &str,
        config: &LockConfig,
        call_timeout: Duration,
    ) -> StrataResult<Option<Self>> {
        let ttl = Duration::from_secs(config.lease_ttl_secs);
        let granted = tokio::time::timeout(call_timeout, lock.try_acquire(key, holder, ttl))
            .await
            .map_err(|_| {
                LockError::Backend(format!(
                    "acquire of {key} timed out after {} ms",
                    call_timeout.as_millis()
                ))
            })??;

        let Some(lease) = granted else {
            debug!(key, holder, "lock held elsewhere");
            return Ok(None);
        };
        debug!(key, holder, fencing_token = lease.fencing_token, "lock acquired");
        Ok(Some(Self::start(
            lock,
            lease,
            ttl,
            Duration::from_secs(config.renew_interval_secs),
            call_timeout,
        )))
    }

    fn start(
        lock: Arc<dyn IDistributedLock>,
        lease: LockLease,
        ttl: Duration,
        every: Duration,
        call_timeout: Duration,
    ) -> Self {
        let lease = Arc::new(Mutex::new(lease));
        let lost = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task_lock = lock.clone();
        let task_lease = lease.clone();
        let task_lost = lost.clone();
        let renew_timeout = call_timeout.min(ttl);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(every) => {}
                    _ = shutdown_rx.changed() => break,
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                let current = task_lease.lock().unwrap_or_else(|e| e.into_inner()).clone();
                match tokio::time::timeout(renew_timeout, task_lock.renew(&current, ttl)).await {
                    Ok(Ok(renewed)) => {
                        debug!(key = %renewed.key, expires_at = %renewed.expires_at, "lease renewed");
                        *task_lease.lock().unwrap_or_else(|e| e.into_inner()) = renewed;
                    }
                    Ok(Err(e)) => {
                        warn!(key = %current.key, error = %e, "lease renewal failed, lock lost");
                        task_lost.store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(_) => {
                        warn!(
                            key = %current.key,
                            timeout_ms = renew_timeout.as_millis() as u64,
                            "lease renewal timed out, lock lost"
                        );
                        task_lost.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        Self {
            lock,
            lease,
            lost,
            call_timeout,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn lease(&self) -> LockLease {
        self.lease.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Renewal failed; writes guarded by this lease are no longer protected.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }

    /// Stop renewing and release the lease. Returns false if it had already
    /// been lost. A release that times out leaves expiry to reclaim the lock.
    pub async fn release(mut self) -> StrataResult<bool> {
        self.stop();
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(self.call_timeout, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        let lease = self.lease();
        let released = match tokio::time::timeout(self.call_timeout, self.lock.release(&lease)).await {
            Ok(released) => released?,
            Err(_) => {
                self.lost.store(true, Ordering::SeqCst);
                return Err(LockError::Backend(format!(
                    "release of {} timed out after {} ms",
                    lease.key,
                    self.call_timeout.as_millis()
                ))
                .into());
            }
        };
        info!(key = %lease.key, released, "lock released");
        Ok(released)
    }
}

impl Drop for LeaseKeeper {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
