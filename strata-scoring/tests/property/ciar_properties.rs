//! Property tests for CIAR: bounds and monotonicity over the whole input space.

use chrono::Duration;
use proptest::prelude::*;

use strata_core::config::{CiarConfig, DecayFunction};
use strata_scoring::{CiarInput, CiarScorer};

fn decay_strategy() -> impl Strategy<Value = DecayFunction> {
    prop_oneof![
        (1.0f64..10_000.0).prop_map(|h| DecayFunction::Exponential { half_life_hours: h }),
        (1.0f64..10_000.0).prop_map(|h| DecayFunction::Linear { horizon_hours: h }),
        Just(DecayFunction::None),
    ]
}

fn scorer_strategy() -> impl Strategy<Value = CiarScorer> {
    (decay_strategy(), 0.0f64..2.0, 0.5f64..500.0).prop_map(|(decay, weight, half_life)| {
        CiarScorer::new(CiarConfig {
            threshold: 0.6,
            decay,
            recency_weight: weight,
            recency_half_life_hours: half_life,
        })
        .unwrap()
    })
}

fn input(c: f64, i: f64, age_min: i64, since_min: i64) -> CiarInput {
    CiarInput {
        certainty: c,
        impact: i,
        age: Duration::minutes(age_min),
        since_reference: Duration::minutes(since_min),
    }
}

proptest! {
    #[test]
    fn score_is_always_in_unit_interval(
        scorer in scorer_strategy(),
        c in -1.0f64..2.0,
        i in -1.0f64..2.0,
        age in -10_000i64..1_000_000,
        since in -10_000i64..1_000_000,
    ) {
        let s = scorer.score(&input(c, i, age, since));
        prop_assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
    }

    #[test]
    fn certainty_is_monotonic(
        scorer in scorer_strategy(),
        c in 0.0f64..1.0,
        dc in 0.0f64..1.0,
        i in 0.0f64..1.0,
        age in 0i64..1_000_000,
        since in 0i64..1_000_000,
    ) {
        let lo = scorer.score(&input(c, i, age, since));
        let hi = scorer.score(&input((c + dc).min(1.0), i, age, since));
        prop_assert!(hi >= lo, "certainty up lowered score: {} -> {}", lo, hi);
    }

    #[test]
    fn impact_is_monotonic(
        scorer in scorer_strategy(),
        c in 0.0f64..1.0,
        i in 0.0f64..1.0,
        di in 0.0f64..1.0,
        age in 0i64..1_000_000,
        since in 0i64..1_000_000,
    ) {
        let lo = scorer.score(&input(c, i, age, since));
        let hi = scorer.score(&input(c, (i + di).min(1.0), age, since));
        prop_assert!(hi >= lo, "impact up lowered score: {} -> {}", lo, hi);
    }

    #[test]
    fn age_never_raises_the_score(
        scorer in scorer_strategy(),
        c in 0.0f64..1.0,
        i in 0.0f64..1.0,
        age in 0i64..1_000_000,
        dage in 0i64..1_000_000,
        since in 0i64..1_000_000,
    ) {
        let young = scorer.score(&input(c, i, age, since));
        let old = scorer.score(&input(c, i, age + dage, since));
        prop_assert!(old <= young, "older scored higher: {} -> {}", young, old);
    }
}
