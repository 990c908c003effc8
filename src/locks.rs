use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A registry of async mutexes, one per key.
///
/// Holding the guard for a key serializes every request touching that key
/// (one shopper, one cart, one product) while leaving other keys free.
/// Callers needing two keys must always take them in the same order.
///
/// An entry lives only while someone holds or waits on it: the last guard to
/// drop removes it, so the registry stays as small as the set of keys in use.
pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    locks: DashMap<K, Arc<Mutex<()>>>,
}

/// Exclusive access to one key of a [`KeyedLocks`] registry.
pub struct KeyGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    registry: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        // Clone the Arc out so the dashmap shard is not held across the await.
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        KeyGuard {
            registry: self,
            key: key.clone(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for KeyGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters cloned the Arc before awaiting, so a count of one means the
        // map is the only owner left. `lock` clones under the same shard lock.
        self.registry
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
