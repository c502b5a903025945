/// Consolidation subsystem errors.
#[derive(Debug, thiserror::Error)]
pub enum ConsolidationError {
    #[error("episode {episode_id} only partially written: pending {pending}")]
    PartialWrite { episode_id: String, pending: String },

    #[error("repair of episode {episode_id} still failing after {attempts} attempts")]
    RepairExhausted { episode_id: String, attempts: u32 },

    #[error("cluster has no facts with provenance")]
    EmptyCluster,
}
