//! Bounded caches shared by verification threads

use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Thread-safe cache interface injected into the engine
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn insert(&self, key: K, value: V);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Least-recently-used cache behind a mutex
pub struct LruCache<K: Hash + Eq, V> {
    inner: Mutex<lru::LruCache<K, V>>,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    /// A zero capacity is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(lru::LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Hash + Eq + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    fn insert(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
