//! Turn ingestion into L1.

use strata_core::errors::{StrataError, StrataResult};
use strata_core::models::{TurnRecord, TurnRole};
use strata_core::traits::ITierStore;
use strata_core::Clock;

/// Store one raw turn, stamped with the clock's time and an id of
/// `{session}:{sequence}`. Re-ingesting the same sequence overwrites it.
pub async fn ingest_turn(
    l1: &dyn ITierStore<TurnRecord>,
    clock: &dyn Clock,
    session_id: &str,
    sequence: u64,
    role: TurnRole,
    text: &str,
) -> StrataResult<TurnRecord> {
    if session_id.trim().is_empty() {
        return Err(StrataError::ValidationError(
            "turn session_id must not be empty".into(),
        ));
    }
    let record = TurnRecord::new(session_id, sequence, role, text, clock.now());
    l1.store(&record).await?;
    tracing::trace!(turn_id = %record.id, "turn ingested");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ManualClock;
    use test_fixtures::InMemoryTierStore;

    #[tokio::test]
    async fn assigns_id_and_timestamp() {
        let store = InMemoryTierStore::<TurnRecord>::new();
        let clock = ManualClock::default();
        let turn = ingest_turn(&*store, &clock, "s1", 4, TurnRole::User, "hi")
            .await
            .unwrap();
        assert_eq!(turn.id, "s1:4");
        assert_eq!(turn.timestamp, clock.now());
        assert!(!turn.processed);
        assert!(store.contains("s1:4"));
    }

    #[tokio::test]
    async fn rejects_blank_session() {
        let store = InMemoryTierStore::<TurnRecord>::new();
        let clock = ManualClock::default();
        assert!(ingest_turn(&*store, &clock, " ", 1, TurnRole::User, "hi")
            .await
            .is_err());
    }
}
