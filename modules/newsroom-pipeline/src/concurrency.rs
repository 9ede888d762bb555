//! Per-user single-flight guard, built on the shared keyed-lock primitive
//! (§4.8, §5). `ProviderSemaphores` lives in `newsroom_common` so the
//! dialogue manager draws on the same process-global counters.
use newsroom_common::concurrency::KeyedLocks;

pub use newsroom_common::concurrency::ProviderSemaphores;

/// At most one pipeline run per user; a second request either waits
/// (bounded, polled — see `PipelineOrchestrator::acquire_user_slot`) or is
/// rejected with `BusyRetry`, depending on the caller's choice (§4.8).
pub type UserLocks = KeyedLocks<String>;
pub type UserSlotGuard = newsroom_common::concurrency::KeyedLockGuard<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_for_same_user_is_rejected() {
        let locks = UserLocks::new();
        let guard = locks.try_acquire(&"u1".to_string()).await;
        assert!(guard.is_some());
        assert!(locks.try_acquire(&"u1".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn dropping_guard_releases_the_slot() {
        let locks = UserLocks::new();
        {
            let _guard = locks.try_acquire(&"u1".to_string()).await;
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(locks.try_acquire(&"u1".to_string()).await.is_some());
    }

    #[tokio::test]
    async fn different_users_do_not_contend() {
        let locks = UserLocks::new();
        let _a = locks.try_acquire(&"u1".to_string()).await;
        assert!(locks.try_acquire(&"u2".to_string()).await.is_some());
    }
}
