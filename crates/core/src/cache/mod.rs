use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A cached value and when it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: DateTime<Utc>,
}

/// Keyed cache with a freshness policy decided by the implementation.
///
/// `now` is passed in so callers (and tests) control the clock.
pub trait Cache<V>: Send + Sync {
    /// A fresh entry for `key`, if any. Stale entries are dropped on read.
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry<V>>;

    fn put(&self, key: &str, entry: CacheEntry<V>);

    fn evict(&self, key: &str);
}

/// Bounded LRU cache whose entries expire `ttl` after they were fetched.
#[derive(Clone)]
pub struct TtlCache<V> {
    inner: Arc<Mutex<LruCache<String, CacheEntry<V>>>>,
    ttl: chrono::Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.fetched_at) < self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry<V>>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone + Send> Cache<V> for TtlCache<V> {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry<V>> {
        let mut cache = self.lock();
        let entry = cache.get(key)?.clone();
        if self.is_fresh(&entry, now) {
            Some(entry)
        } else {
            cache.pop(key);
            None
        }
    }

    fn put(&self, key: &str, entry: CacheEntry<V>) {
        self.lock().put(key.to_string(), entry);
    }

    fn evict(&self, key: &str) {
        self.lock().pop(key);
    }
}
