//! Named resource locks
//!
//! Serializes read-modify-write sequences against the same remote object,
//! e.g. two routes being written to one IoT Hub. The manager is owned and
//! passed to handlers through [`ProviderContext`](crate::resource::ProviderContext).
//!
//! Locks are advisory and in-process only.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Key naming a shared remote object within a resource-type namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    namespace: String,
    name: String,
}

impl LockKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

type LockMap = HashMap<LockKey, Arc<AsyncMutex<()>>>;

/// Map from [`LockKey`] to a mutual-exclusion primitive
#[derive(Default)]
pub struct LockManager {
    locks: Arc<Mutex<LockMap>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder of `key` exists, then take the lock
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn acquire(&self, key: &LockKey) -> LockGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        // Prunes the entry if this wait is cancelled before the lock is won
        let _waiter = Waiter {
            key,
            locks: &self.locks,
        };
        let started = Instant::now();
        let guard = mutex.lock_owned().await;
        tracing::debug!(
            "Acquired lock {} after {}ms",
            key,
            started.elapsed().as_millis()
        );

        LockGuard {
            key: key.clone(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Remove `key` once only the map itself still references its mutex
fn prune_idle(locks: &mut LockMap, key: &LockKey) {
    if locks.get(key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
        locks.remove(key);
    }
}

/// Pending [`LockManager::acquire`] call
///
/// When dropped the wait's own handle on the mutex is already gone, so a
/// cancelled last waiter leaves no entry behind. After a successful wait
/// the returned guard still holds the mutex and nothing is pruned.
struct Waiter<'a> {
    key: &'a LockKey,
    locks: &'a Mutex<LockMap>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        prune_idle(&mut self.locks.lock(), self.key);
    }
}

/// Held lock for one [`LockKey`]
#[derive(Debug)]
pub struct LockGuard {
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Release the lock now instead of at end of scope
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Waiters clone the Arc under the map lock, so the strong count
        // observed here is exact.
        let mut locks = self.locks.lock();
        drop(self.guard.take());
        prune_idle(&mut locks, &self.key);
        tracing::debug!("Released lock {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_lock_key_display() {
        let key = LockKey::new("azurerm_iothub", "hub1");
        assert_eq!(key.to_string(), "azurerm_iothub.hub1");
    }

    #[tokio::test]
    async fn test_same_key_blocks_until_release() {
        let manager = LockManager::new();
        let key = LockKey::new("azurerm_iothub", "hub1");

        let first = manager.acquire(&key).await;

        let mut second = task::spawn(manager.acquire(&key));
        assert_pending!(second.poll());

        drop(first);
        assert!(second.is_woken());
        let guard = assert_ready!(second.poll());
        assert_eq!(guard.key(), &key);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let manager = LockManager::new();
        let hub1 = LockKey::new("azurerm_iothub", "hub1");
        let hub2 = LockKey::new("azurerm_iothub", "hub2");
        let other_namespace = LockKey::new("azurerm_purview", "hub1");

        let _held = manager.acquire(&hub1).await;

        let mut other_hub = task::spawn(manager.acquire(&hub2));
        assert_ready!(other_hub.poll());

        let mut other_type = task::spawn(manager.acquire(&other_namespace));
        assert_ready!(other_type.poll());
    }

    #[tokio::test]
    async fn test_idle_keys_are_pruned() {
        let manager = LockManager::new();
        let key = LockKey::new("azurerm_iothub", "hub1");

        let guard = manager.acquire(&key).await;
        assert_eq!(manager.active_keys(), 1);
        guard.release();
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_exists() {
        let manager = LockManager::new();
        let key = LockKey::new("azurerm_iothub", "hub1");

        let first = manager.acquire(&key).await;
        let mut second = task::spawn(manager.acquire(&key));
        assert_pending!(second.poll());

        drop(first);
        assert_eq!(manager.active_keys(), 1);
        let guard = assert_ready!(second.poll());
        drop(guard);
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let manager = LockManager::new();
        let key = LockKey::new("azurerm_iothub", "hub1");

        // holder releases first, then the waiter gives up
        let first = manager.acquire(&key).await;
        let mut second = task::spawn(manager.acquire(&key));
        assert_pending!(second.poll());
        drop(first);
        assert_eq!(manager.active_keys(), 1);
        drop(second);
        assert_eq!(manager.active_keys(), 0);

        // waiter gives up while the lock is still held
        let first = manager.acquire(&key).await;
        let mut second = task::spawn(manager.acquire(&key));
        assert_pending!(second.poll());
        drop(second);
        assert_eq!(manager.active_keys(), 1);
        drop(first);
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_waiter_leaves_no_entry() {
        let manager = LockManager::new();
        let key = LockKey::new("azurerm_iothub", "hub1");

        let held = manager.acquire(&key).await;
        let waited = tokio::time::timeout(Duration::from_millis(10), manager.acquire(&key)).await;
        assert!(waited.is_err());
        held.release();
        assert_eq!(manager.active_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_critical_sections_never_overlap() {
        let manager = Arc::new(LockManager::new());
        let key = LockKey::new("azurerm_iothub", "hub1");
        let intervals = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let key = key.clone();
            let intervals = Arc::clone(&intervals);
            handles.push(tokio::spawn(async move {
                let _guard = manager.acquire(&key).await;
                let start = Instant::now();
                tokio::time::sleep(Duration::from_millis(5)).await;
                intervals.lock().push((start, Instant::now()));
            }));
        }
        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }

        let mut intervals = intervals.lock().clone();
        intervals.sort();
        for pair in intervals.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "critical sections overlapped");
        }
    }
}
