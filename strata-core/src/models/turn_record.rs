//! L1: raw conversational turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
    Tool,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

/// One raw conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// `{session_id}:{sequence}`.
    pub id: String,
    pub session_id: String,
    /// Monotonic within a session.
    pub sequence: u64,
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Set once the turn has been through a promotion batch, whatever the
    /// outcome. Processed is not the same as promoted.
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TurnRecord {
    pub fn new(
        session_id: impl Into<String>,
        sequence: u64,
        role: TurnRole,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            id: Self::compute_id(&session_id, sequence),
            session_id,
            sequence,
            role,
            text: text.into(),
            timestamp,
            processed: false,
            processed_at: None,
        }
    }

    pub fn compute_id(session_id: &str, sequence: u64) -> String {
        format!("{session_id}:{sequence}")
    }

    /// Copy of this turn marked processed at `at`.
    pub fn mark_processed(&self, at: DateTime<Utc>) -> Self {
        Self {
            processed: true,
            processed_at: Some(at),
            ..self.clone()
        }
    }
}
