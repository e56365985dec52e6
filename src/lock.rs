//! Per-key async locks kept in a concurrent map.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub(crate) type LockMap<K> = DashMap<K, Arc<Mutex<()>>>;

/// Holds the lock of one key
///
/// On release the map entry is removed once no other task holds or awaits
/// it, so the map only ever contains keys in use.
pub(crate) struct KeyedGuard<'a, K: Eq + Hash> {
    locks: &'a LockMap<K>,
    key: K,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a, K: Eq + Hash + Clone> KeyedGuard<'a, K> {
    pub(crate) async fn acquire(locks: &'a LockMap<K>, key: K) -> Self {
        let lock = locks.entry(key.clone()).or_default().clone();
        let guard = Arc::clone(&lock).lock_owned().await;
        Self {
            locks,
            key,
            lock,
            guard: Some(guard),
        }
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();
        // The map and this guard hold the only references
        self.locks.remove_if(&self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}
