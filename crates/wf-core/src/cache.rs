//! Bounded LRU cache.
//!
//! One eviction contract for every ad hoc cache in the engine: a hard capacity
//! ceiling with least-recently-used eviction and amortized O(1) get/insert.
//! Recency is tracked with a stamp queue; stale queue entries are skipped at
//! eviction time instead of being removed eagerly.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: VecDeque<(K, u64)>,
    stamp: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a new LRU cache with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be non-zero");
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            stamp: 0,
        }
    }

    /// Get a value, refreshing its recency.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.stamp += 1;
        let stamp = self.stamp;
        match self.entries.get_mut(key) {
            Some((_, s)) => {
                *s = stamp;
                self.order.push_back((key.clone(), stamp));
            }
            None => return None,
        }
        self.maybe_compact();
        self.entries.get(key).map(|(v, _)| v)
    }

    /// Insert a value, evicting the least recently used entry at capacity.
    pub fn insert(&mut self, key: K, value: V) {
        self.stamp += 1;
        let stamp = self.stamp;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.order.push_back((key.clone(), stamp));
        self.entries.insert(key, (value, stamp));
        self.maybe_compact();
    }

    /// Remove an entry, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(v, _)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn evict_one(&mut self) {
        while let Some((key, stamp)) = self.order.pop_front() {
            let current = match self.entries.get(&key) {
                Some((_, s)) => *s,
                None => continue,
            };
            if current != stamp {
                // Stale queue entry; the key was touched again later.
                continue;
            }
            self.entries.remove(&key);
            return;
        }
    }

    fn maybe_compact(&mut self) {
        if self.order.len() < self.capacity.saturating_mul(8).max(64) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(key, stamp)| matches!(entries.get(key), Some((_, s)) if s == stamp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut cache = LruCache::new(4);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"missing"), None);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the eviction victim.
        cache.get(&"a");
        cache.insert("c", 3);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_updates_value() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.get(&"a"), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stays_within_capacity_under_churn() {
        let mut cache = LruCache::new(8);
        for i in 0..1000 {
            cache.insert(i, i);
        }
        assert_eq!(cache.len(), 8);
        // Most recent entries survive.
        assert_eq!(cache.get(&999), Some(&999));
        assert_eq!(cache.get(&0), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
    }
}
