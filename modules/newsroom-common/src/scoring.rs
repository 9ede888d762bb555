//! Recency decay shared by card ranking (§4.6) and retrieval re-ranking
//! (§4.9) — both name the same `recencyDecay(t)` term.
use chrono::{DateTime, Utc};

const HALFLIFE_HOURS: f32 = 48.0;
const FLOOR: f32 = 0.05;

/// `exp(-Δhours / 48)` clamped to `[0.05, 1]`.
pub fn recency_decay(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let elapsed_hours = (now - published_at).num_seconds() as f32 / 3600.0;
    (-elapsed_hours / HALFLIFE_HOURS).exp().clamp(FLOOR, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn clamps_to_floor_for_old_timestamps() {
        let now = Utc::now();
        assert_eq!(recency_decay(now - Duration::days(30), now), FLOOR);
    }

    #[test]
    fn is_near_one_for_fresh_timestamps() {
        let now = Utc::now();
        assert!((recency_decay(now, now) - 1.0).abs() < 0.001);
    }
}
