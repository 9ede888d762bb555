//! Token bucket for the provider's stated rate ceiling (§4.1).
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::time::Duration;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Mutex::new(Bucket { tokens: capacity as f64, last_refill: Instant::now() }),
        }
    }

    /// Block until a single token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_down_to_zero_without_blocking() {
        let bucket = TokenBucket::new(3, 1.0);
        for _ in 0..3 {
            bucket.acquire().await;
        }
    }
}
