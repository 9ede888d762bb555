//! Exponential time decay for the interest vector and category weights
//! (§4.7): half-life 14 days by default, configurable via
//! `FileConfig::memory_decay_halflife_days`.
use chrono::Duration;

/// `2^(-elapsed / halflife)`. Multiplicative over successive intervals,
/// which is what makes the running-mean rescale trick in [`crate::store`]
/// exact: `decay(a + b) == decay(a) * decay(b)`.
pub fn decay_factor(elapsed: Duration, halflife_days: f64) -> f64 {
    let elapsed_days = elapsed.num_milliseconds() as f64 / 86_400_000.0;
    2f64.powf(-elapsed_days / halflife_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_is_full_weight() {
        assert!((decay_factor(Duration::zero(), 14.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn one_halflife_halves_weight() {
        let f = decay_factor(Duration::days(14), 14.0);
        assert!((f - 0.5).abs() < 1e-9);
    }

    #[test]
    fn decay_is_multiplicative_over_intervals() {
        let a = decay_factor(Duration::days(5), 14.0);
        let b = decay_factor(Duration::days(9), 14.0);
        let combined = decay_factor(Duration::days(14), 14.0);
        assert!((a * b - combined).abs() < 1e-9);
    }
}
