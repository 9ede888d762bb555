//! A generic single-flight-per-key guard (§4.8, §4.10, §5): at most one
//! task may hold a given key at a time. Used for per-user pipeline runs and
//! per-session dialogue turns alike.
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

/// Releases its key on drop, whether the holding task finished, failed, or
/// panicked. `Drop` can't be async, so release is handed off to a detached
/// task.
pub struct KeyedLockGuard<K: Eq + Hash + Clone + Send + Sync + 'static> {
    key: K,
    held: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Drop for KeyedLockGuard<K> {
    fn drop(&mut self) {
        let held = self.held.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            held.lock().await.remove(&key);
        });
    }
}

#[derive(Clone)]
pub struct KeyedLocks<K: Eq + Hash + Clone + Send + Sync + 'static> {
    held: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> KeyedLocks<K> {
    pub fn new() -> Self {
        Self { held: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Attempts to claim `key`. Returns `None` if another holder is active.
    pub async fn try_acquire(&self, key: &K) -> Option<KeyedLockGuard<K>> {
        let mut set = self.held.lock().await;
        if set.insert(key.clone()) {
            Some(KeyedLockGuard { key: key.clone(), held: self.held.clone() })
        } else {
            None
        }
    }
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-global semaphores bounding in-flight calls per outbound
/// dependency — search (C1), LLM (C4), sentiment (C5). Shared by the
/// pipeline orchestrator and the dialogue manager so both paths draw from
/// the same counters (§5: "provider semaphores are process-global").
/// Permits release even on failure because `SemaphorePermit`'s drop is
/// unconditional.
pub struct ProviderSemaphores {
    pub search: Semaphore,
    pub llm: Semaphore,
    pub sentiment: Semaphore,
}

impl ProviderSemaphores {
    pub fn new(search_concurrency: usize, llm_concurrency: usize, sentiment_concurrency: usize) -> Self {
        Self {
            search: Semaphore::new(search_concurrency.max(1)),
            llm: Semaphore::new(llm_concurrency.max(1)),
            sentiment: Semaphore::new(sentiment_concurrency.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_for_same_key_is_rejected() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let guard = locks.try_acquire(&"a".to_string()).await;
        assert!(guard.is_some());
        assert!(locks.try_acquire(&"a".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn dropping_guard_releases_the_key() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        {
            let _guard = locks.try_acquire(&"a".to_string()).await;
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(locks.try_acquire(&"a".to_string()).await.is_some());
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let _a = locks.try_acquire(&"a".to_string()).await;
        assert!(locks.try_acquire(&"b".to_string()).await.is_some());
    }
}
