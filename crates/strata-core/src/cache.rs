//! Bounded read-through cache with per-entry expiry.
//!
//! Metadata types and products are created rarely and read constantly, so
//! their resources wrap lookups in this cache: entries live for a fixed
//! time-to-live, the cache holds at most `capacity` entries, and the
//! least-recently-used entry is evicted on overflow. A stale entry is
//! never served past its TTL; it is dropped on access and the caller
//! re-fetches. Writers do not invalidate; readers may observe up to one
//! TTL window of staleness after a write.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

impl<V> Entry<V> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

/// A capacity- and TTL-bounded map with least-recently-used eviction.
///
/// Not synchronized; callers wrap it in a lock when shared.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Creates a cache holding at most `capacity` entries, each valid for `ttl`.
    ///
    /// A zero capacity disables caching: every insert is immediately evicted.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            ttl,
            clock: 0,
        }
    }

    /// Returns the cached value for `key` if present and unexpired.
    ///
    /// Accessing an entry marks it as recently used; an expired entry is
    /// removed and `None` is returned.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let fresh = self.entries.get(key).is_some_and(|e| e.is_fresh(self.ttl));
        if !fresh {
            self.entries.remove(key);
            return None;
        }
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used = clock;
            entry.value.clone()
        })
    }

    /// Inserts a value, evicting the least-recently-used entry on overflow.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        self.clock += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                last_used: self.clock,
            },
        );
        if self.entries.len() > self.capacity {
            self.evict_lru();
        }
    }

    /// Number of entries currently held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_lru(&mut self) {
        // Prefer dropping an expired entry; otherwise the coldest one.
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.is_fresh(self.ttl), e.last_used))
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(60);

    #[test]
    fn get_returns_inserted_value() {
        let mut cache = TtlCache::new(4, LONG);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn expired_entries_are_not_served() {
        let mut cache = TtlCache::new(4, Duration::from_millis(10));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty(), "expired entry should be dropped on access");
    }

    #[test]
    fn overflow_evicts_least_recently_used() {
        let mut cache = TtlCache::new(2, LONG);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the cold entry.
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn reinsert_replaces_value() {
        let mut cache = TtlCache::new(2, LONG);
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache = TtlCache::new(0, LONG);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn expired_entries_are_preferred_eviction_victims() {
        let mut cache = TtlCache::new(2, Duration::from_millis(10));
        cache.insert("old", 1);
        std::thread::sleep(Duration::from_millis(25));
        cache.insert("fresh", 2);
        cache.insert("newer", 3);
        // "old" expired, so it should be the victim despite "fresh" being colder.
        assert_eq!(cache.get(&"fresh"), Some(2));
        assert_eq!(cache.get(&"newer"), Some(3));
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = TtlCache::new(4, LONG);
        cache.insert("a", 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
