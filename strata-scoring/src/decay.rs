//! Age decay and recency boost factors. Both are pure functions of their
//! inputs.

use std::f64::consts::LN_2;

use strata_core::config::DecayFunction;

/// Age discount in [0, 1]. Non-increasing in `age_hours`; negative ages
/// (clock skew) count as zero, NaN counts as infinitely old.
pub fn age_decay(decay: &DecayFunction, age_hours: f64) -> f64 {
    if age_hours.is_nan() {
        return 0.0;
    }
    let age = age_hours.max(0.0);
    match *decay {
        DecayFunction::Exponential { half_life_hours } => (-LN_2 * age / half_life_hours).exp(),
        DecayFunction::Linear { horizon_hours } => (1.0 - age / horizon_hours).clamp(0.0, 1.0),
        DecayFunction::None => 1.0,
    }
}

/// Multiplicative boost in [1, 1 + weight] that halves its excess every
/// `half_life_hours` since the last reference.
pub fn recency_boost(weight: f64, half_life_hours: f64, since_reference_hours: f64) -> f64 {
    if since_reference_hours.is_nan() {
        return 1.0;
    }
    let since = since_reference_hours.max(0.0);
    1.0 + weight * (-LN_2 * since / half_life_hours).exp()
}
