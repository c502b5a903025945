//! The CIAR scorer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use strata_core::config::CiarConfig;
use strata_core::errors::StrataResult;
use strata_core::models::Fact;

use crate::decay::{age_decay, recency_boost};

/// Inputs to one score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CiarInput {
    pub certainty: f64,
    pub impact: f64,
    /// Time since the source record was created.
    pub age: Duration,
    /// Time since the record was last referenced.
    pub since_reference: Duration,
}

impl CiarInput {
    /// Build an input from timestamps, measured at `now`.
    pub fn at(
        certainty: f64,
        impact: f64,
        created_at: DateTime<Utc>,
        last_referenced_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            certainty,
            impact,
            age: now - created_at,
            since_reference: now - last_referenced_at,
        }
    }
}

/// Per-factor view of a score, for logs and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CiarBreakdown {
    pub certainty: f64,
    pub impact: f64,
    pub age_decay: f64,
    pub recency_boost: f64,
    pub score: f64,
}

/// Certainty-Impact-Age-Recency scorer.
///
/// Monotonic: raising certainty or impact never lowers the score, raising age
/// never raises it. Always in [0, 1].
#[derive(Debug, Clone)]
pub struct CiarScorer {
    config: CiarConfig,
}

impl CiarScorer {
    pub fn new(config: CiarConfig) -> StrataResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn config(&self) -> &CiarConfig {
        &self.config
    }

    pub fn breakdown(&self, input: &CiarInput) -> CiarBreakdown {
        let certainty = unit(input.certainty);
        let impact = unit(input.impact);
        let decay = age_decay(&self.config.decay, hours(input.age));
        let boost = recency_boost(
            self.config.recency_weight,
            self.config.recency_half_life_hours,
            hours(input.since_reference),
        );
        let score = (certainty * impact * decay * boost).clamp(0.0, 1.0);
        CiarBreakdown {
            certainty,
            impact,
            age_decay: decay,
            recency_boost: boost,
            score,
        }
    }

    pub fn score(&self, input: &CiarInput) -> f64 {
        self.breakdown(input).score
    }

    /// Score a fact as of `now`.
    pub fn score_fact(&self, fact: &Fact, now: DateTime<Utc>) -> f64 {
        self.score(&CiarInput::at(
            fact.certainty,
            fact.impact,
            fact.created_at,
            fact.last_referenced_at,
            now,
        ))
    }

    pub fn should_promote(&self, score: f64) -> bool {
        score >= self.config.threshold
    }
}

impl Default for CiarScorer {
    fn default() -> Self {
        Self {
            config: CiarConfig::default(),
        }
    }
}

/// Clamp to [0, 1]; non-finite becomes 0.
fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}
