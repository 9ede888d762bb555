//! Exponential backoff with jitter for 429/503 responses (§4.1): base 500ms,
//! factor 2, jitter ±25%, capped at 3 attempts total.
use rand::Rng;
use tokio::time::Duration;

pub const MAX_ATTEMPTS: u32 = 3;
const BASE: Duration = Duration::from_millis(500);
const FACTOR: u32 = 2;
const JITTER: f64 = 0.25;

/// Delay before retry attempt `attempt` (0-based: the delay before the
/// *second* call is `delay_for(0)`).
pub fn delay_for(attempt: u32) -> Duration {
    let backoff = BASE * FACTOR.pow(attempt);
    let jitter_frac = rand::thread_rng().gen_range(-JITTER..=JITTER);
    let millis = (backoff.as_millis() as f64) * (1.0 + jitter_frac);
    Duration::from_millis(millis.max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt_within_jitter_bounds() {
        let d0 = delay_for(0);
        assert!(d0.as_millis() >= 375 && d0.as_millis() <= 625);
        let d1 = delay_for(1);
        assert!(d1.as_millis() >= 750 && d1.as_millis() <= 1250);
    }
}
