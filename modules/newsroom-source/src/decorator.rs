//! `RateLimitedSearcher` wraps any [`NewsSearcher`] with token-bucket rate
//! limiting and exponential-backoff retry (§4.1): the cross-cutting concern
//! lives entirely in the wrapper, and the inner adapter stays a one-shot
//! HTTP call.
use async_trait::async_trait;
use newsroom_common::types::RawArticle;
use tracing::warn;

use ai_client::Cancellation;

use crate::backoff::{delay_for, MAX_ATTEMPTS};
use crate::error::{SourceError, SourceResult};
use crate::rate_limit::TokenBucket;
use crate::searcher::{NewsSearcher, SearchOptions};

pub struct RateLimitedSearcher<S: NewsSearcher> {
    inner: S,
    bucket: TokenBucket,
}

impl<S: NewsSearcher> RateLimitedSearcher<S> {
    /// `capacity`/`refill_per_sec` come from the provider's stated ceiling.
    pub fn new(inner: S, capacity: u32, refill_per_sec: f64) -> Self {
        Self { inner, bucket: TokenBucket::new(capacity, refill_per_sec) }
    }
}

#[async_trait]
impl<S: NewsSearcher> NewsSearcher for RateLimitedSearcher<S> {
    async fn search(&self, query: &str, options: &SearchOptions, cancel: &Cancellation) -> SourceResult<Vec<RawArticle>> {
        let mut last_was_rate_limited = false;

        for attempt in 0..MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }

            self.bucket.acquire().await;

            match self.inner.search(query, options, cancel).await {
                Ok(articles) => return Ok(articles),
                Err(SourceError::ProviderRateLimited(msg)) => {
                    last_was_rate_limited = true;
                    warn!(%query, attempt, "provider rate-limited, backing off");
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(delay_for(attempt)).await;
                        continue;
                    }
                    let _ = msg;
                }
                Err(SourceError::ProviderUnavailable(msg)) => {
                    last_was_rate_limited = false;
                    warn!(%query, attempt, %msg, "provider unavailable, backing off");
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(delay_for(attempt)).await;
                        continue;
                    }
                }
                Err(other) => return Err(other),
            }
        }

        if last_was_rate_limited {
            Err(SourceError::ProviderRateLimited(format!("exhausted {MAX_ATTEMPTS} attempts for query {query:?}")))
        } else {
            Err(SourceError::ProviderUnavailable(format!("exhausted {MAX_ATTEMPTS} attempts for query {query:?}")))
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakySearcher {
        calls: Arc<AtomicU32>,
        fail_times: u32,
    }

    #[async_trait]
    impl NewsSearcher for FlakySearcher {
        async fn search(&self, _query: &str, _options: &SearchOptions, _cancel: &Cancellation) -> SourceResult<Vec<RawArticle>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(SourceError::ProviderUnavailable("flaky".into()))
            } else {
                Ok(vec![])
            }
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let searcher = RateLimitedSearcher::new(FlakySearcher { calls: calls.clone(), fail_times: 2 }, 10, 100.0);
        let result = searcher.search("q", &SearchOptions::new(5), &Cancellation::new()).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_budget_on_unavailable_returns_unavailable() {
        let calls = Arc::new(AtomicU32::new(0));
        let searcher = RateLimitedSearcher::new(FlakySearcher { calls: calls.clone(), fail_times: 10 }, 10, 100.0);
        let result = searcher.search("q", &SearchOptions::new(5), &Cancellation::new()).await;
        assert!(matches!(result, Err(SourceError::ProviderUnavailable(_))));
    }
}
