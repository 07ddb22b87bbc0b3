//! Process-local result cache.
//!
//! A size- and TTL-bounded map from resolution keys to results. Inserting
//! into a full cache first drops expired entries and only then evicts the
//! least-recently-used live one. A lookup never returns an expired entry.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::metrics;

/// Default capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Configuration for [`LocalResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCacheConfig {
    /// Maximum number of entries (at least one is always kept).
    pub max_entries: usize,
    /// TTL applied by [`LocalResultCache::insert`].
    pub default_ttl: Duration,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe LRU cache with per-entry expiry.
#[derive(Debug)]
pub struct LocalResultCache<V> {
    entries: Mutex<LruCache<String, Entry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> LocalResultCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: LocalCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl: config.default_ttl,
        }
    }

    /// Returns a live entry, marking it most recently used.
    ///
    /// An expired entry is purged and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.peek(key) {
            None => {
                metrics::record_lookup("miss");
                return None;
            }
            Some(entry) => entry.is_expired(Instant::now()),
        };
        if expired {
            entries.pop(key);
            metrics::record_lookup("expired");
            metrics::record_evictions("expired", 1);
            return None;
        }
        metrics::record_lookup("hit");
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Inserts with the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Inserts with an explicit TTL.
    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut entries = self.lock();
        let now = Instant::now();

        if !entries.contains(&key) && entries.len() >= entries.cap().get() {
            let purged = purge_expired(&mut entries, now);
            metrics::record_evictions("expired", purged);
            if entries.len() >= entries.cap().get() {
                if let Some((evicted, _)) = entries.pop_lru() {
                    tracing::trace!(key = %evicted, "evicted least recently used entry");
                    metrics::record_evictions("capacity", 1);
                }
            }
        }

        entries.put(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Removes an entry.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().pop(key).map(|entry| entry.value)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the number of stored entries, including expired ones not yet
    /// purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry<V>>> {
        // Every mutation is a single LruCache call, so a poisoned guard still
        // holds a consistent map.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn purge_expired<V>(entries: &mut LruCache<String, Entry<V>>, now: Instant) -> usize {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize, ttl_secs: u64) -> LocalResultCache<u32> {
        LocalResultCache::new(LocalCacheConfig {
            max_entries,
            default_ttl: Duration::from_secs(ttl_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss_and_purged() {
        let cache = cache(4, 10);
        cache.insert("a", 1);
        assert_eq!(cache.get("a"), Some(1));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_least_recently_used() {
        let cache = cache(2, 60);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get("a"), Some(1));

        cache.insert("c", 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_evicted_before_live_ones() {
        let cache = cache(2, 60);
        cache.insert_with_ttl("short", 1, Duration::from_secs(1));
        cache.insert("long", 2);
        // `short` becomes most recently used but is about to expire.
        assert_eq!(cache.get("short"), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert("new", 3);

        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_does_not_evict() {
        let cache = cache(2, 60);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let cache = cache(0, 60);
        assert_eq!(cache.capacity(), 1);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn clear_and_remove() {
        let cache = cache(4, 60);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.remove("a"), Some(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
