//! LeaseKeeper renewal loop and release.

use std::sync::Arc;
use std::time::Duration;

use strata_core::config::LockConfig;
use strata_core::ManualClock;
use strata_resilience::LeaseKeeper;
use test_fixtures::InMemoryLock;

fn lock_config() -> LockConfig {
    LockConfig {
        enabled: true,
        lease_ttl_secs: 30,
        renew_interval_secs: 10,
    }
}

#[tokio::test(start_paused = true)]
async fn renews_until_released() {
    let clock = Arc::new(ManualClock::default());
    let lock = InMemoryLock::new(clock.clone());
    let keeper = LeaseKeeper::acquire(lock.clone(), "session:s1", "node-a", &lock_config(), Duration::from_secs(2))
        .await
        .unwrap()
        .expect("lock should be free");

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(lock.renewals() >= 2, "renewals: {}", lock.renewals());
    assert!(!keeper.is_lost());
    assert_eq!(lock.holder("session:s1").as_deref(), Some("node-a"));

    assert!(keeper.release().await.unwrap());
    assert!(lock.holder("session:s1").is_none());
}

#[tokio::test(start_paused = true)]
async fn second_holder_is_refused() {
    let clock = Arc::new(ManualClock::default());
    let lock = InMemoryLock::new(clock);
    let first = LeaseKeeper::acquire(lock.clone(), "k", "a", &lock_config(), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(first.is_some());
    let second = LeaseKeeper::acquire(lock.clone(), "k", "b", &lock_config(), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_renewal_marks_lease_lost() {
    let clock = Arc::new(ManualClock::default());
    let lock = InMemoryLock::new(clock);
    let keeper = LeaseKeeper::acquire(lock.clone(), "k", "a", &lock_config(), Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    lock.set_fail_renewals(true);
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(keeper.is_lost());
}

#[tokio::test(start_paused = true)]
async fn unanswered_renewal_marks_lease_lost_and_release_is_bounded() {
    let clock = Arc::new(ManualClock::default());
    let lock = InMemoryLock::new(clock);
    let keeper = LeaseKeeper::acquire(lock.clone(), "k", "a", &lock_config(), Duration::from_secs(2))
        .await
        .unwrap()
        .unwrap();
    lock.set_hang(true);

    tokio::time::sleep(Duration::from_secs(13)).await;
    assert!(keeper.is_lost());

    let released = tokio::time::timeout(Duration::from_secs(10), keeper.release()).await;
    let outcome = released.expect("release must give up within its call timeout");
    assert!(outcome.is_err());
}
