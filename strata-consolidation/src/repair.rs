//! Queue of episodes whose dual write has not completed.
//!
//! A task holds the fully built Episode, so a repair only replays the
//! missing index writes. Tasks are never dropped: past `max_attempts` they are
//! escalated in the logs and kept.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use strata_core::errors::{ConsolidationError, StrataResult};
use strata_core::models::{Episode, IndexSide};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTask {
    /// Carries the live write status.
    pub episode: Episode,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl RepairTask {
    pub fn pending_sides(&self) -> Vec<IndexSide> {
        self.episode.write_status.pending_sides()
    }
}

/// Serializable snapshot of the queue, taken at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairCheckpoint {
    pub tasks: Vec<RepairTask>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl RepairCheckpoint {
    pub fn to_json(&self) -> StrataResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> StrataResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug)]
pub struct RepairQueue {
    tasks: Mutex<BTreeMap<String, RepairTask>>,
    max_attempts: u32,
}

impl RepairQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
            max_attempts,
        }
    }

    /// Add or refresh the task for `episode`. An existing task keeps its
    /// attempt count.
    pub fn enqueue(&self, episode: Episode, error: Option<String>, now: DateTime<Utc>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.get_mut(&episode.id) {
            Some(task) => {
                task.episode = episode;
                task.last_error = error.or(task.last_error.take());
            }
            None => {
                tasks.insert(
                    episode.id.clone(),
                    RepairTask {
                        episode,
                        attempts: 0,
                        enqueued_at: now,
                        last_error: error,
                    },
                );
            }
        }
    }

    /// Current tasks, oldest first.
    pub fn snapshot(&self) -> Vec<RepairTask> {
        let mut tasks: Vec<RepairTask> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then_with(|| a.episode.id.cmp(&b.episode.id)));
        tasks
    }

    pub fn get(&self, episode_id: &str) -> Option<RepairTask> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(episode_id)
            .cloned()
    }

    pub fn contains(&self, episode_id: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(episode_id)
    }

    /// Record the sides acknowledged during a repair attempt.
    pub fn acknowledge(&self, episode_id: &str, side: IndexSide) {
        if let Some(task) = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(episode_id)
        {
            task.episode.write_status = task.episode.write_status.with_ack(side);
        }
    }

    /// Count a failed attempt. Past the limit the task is escalated, not dropped.
    pub fn record_failure(&self, episode_id: &str, reason: String) -> u32 {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let Some(task) = tasks.get_mut(episode_id) else {
            return 0;
        };
        task.attempts += 1;
        task.last_error = Some(reason);
        if task.attempts >= self.max_attempts {
            let escalation = ConsolidationError::RepairExhausted {
                episode_id: episode_id.to_string(),
                attempts: task.attempts,
            };
            error!(
                episode_id,
                attempts = task.attempts,
                pending = ?task.pending_sides(),
                "{escalation}; keeping task"
            );
        }
        task.attempts
    }

    /// Remove a finished task.
    pub fn complete(&self, episode_id: &str) -> Option<RepairTask> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(episode_id)
    }

    /// Fact ids owned by queued episodes; these are never re-clustered.
    pub fn bound_fact_ids(&self) -> HashSet<String> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .flat_map(|t| t.episode.source_fact_ids.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Tasks that reached the attempt limit and now wait on an operator.
    pub fn exhausted(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|t| t.attempts >= self.max_attempts)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn checkpoint(&self, now: DateTime<Utc>) -> RepairCheckpoint {
        RepairCheckpoint {
            tasks: self.snapshot(),
            taken_at: Some(now),
        }
    }

    /// Re-import checkpointed tasks. Tasks already queued win.
    pub fn restore(&self, checkpoint: RepairCheckpoint) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let mut restored = 0;
        for task in checkpoint.tasks {
            if !tasks.contains_key(&task.episode.id) {
                tasks.insert(task.episode.id.clone(), task);
                restored += 1;
            }
        }
        info!(restored, queued = tasks.len(), "repair tasks restored");
        restored
    }
}
