//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Every touch stamps the key with a fresh, strictly increasing tick:
/// - Lowest tick = Least recently used
/// - Highest tick = Most recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Next tick to hand out
    tick: u64,
    /// Current tick of each key
    ticks: HashMap<String, u64>,
    /// Keys ordered by tick
    order: BTreeMap<u64, String>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.tick += 1;
        self.ticks.insert(key.to_string(), self.tick);
        self.order.insert(self.tick, key.to_string());
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    // == Oldest Except ==
    /// Returns the least recently used key other than `protected`.
    pub fn oldest_except(&self, protected: &str) -> Option<&String> {
        self.order.values().find(|key| key.as_str() != protected)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    #[cfg(test)]
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.values().next()
    }

    // == Length ==
    /// Returns the number of tracked keys.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    // == Is Empty ==
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.ticks.contains_key(key)
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.ticks.clear();
        self.order.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn test_lru_touch_new_key() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");
        lru.touch("key3");

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&"key1".to_string()));
    }

    #[test]
    fn test_lru_touch_existing_key() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");
        lru.touch("key3");
        lru.touch("key1");

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&"key2".to_string()));
    }

    #[test]
    fn test_lru_oldest_except_skips_protected() {
        let mut lru = LruTracker::new();

        lru.touch("a");
        lru.touch("b");

        assert_eq!(lru.oldest_except("a"), Some(&"b".to_string()));
        assert_eq!(lru.oldest_except("b"), Some(&"a".to_string()));
    }

    #[test]
    fn test_lru_oldest_except_only_protected() {
        let mut lru = LruTracker::new();
        lru.touch("only");

        assert_eq!(lru.oldest_except("only"), None);
        assert_eq!(LruTracker::new().oldest_except("x"), None);
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");
        lru.touch("key3");
        lru.remove("key2");
        lru.remove("nonexistent");

        assert_eq!(lru.len(), 2);
        assert!(!lru.contains("key2"));
        assert!(lru.contains("key1"));
        assert!(lru.contains("key3"));
    }

    #[test]
    fn test_lru_order_after_multiple_touches() {
        let mut lru = LruTracker::new();

        lru.touch("a");
        lru.touch("b");
        lru.touch("c");
        lru.touch("a");
        lru.touch("c");
        lru.touch("b");

        // Oldest to newest: a, c, b
        let order: Vec<&String> = lru.order.values().collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_lru_touch_same_key_multiple_times() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key1");
        lru.touch("key1");

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.order.len(), 1);
    }

    #[test]
    fn test_lru_clear() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.clear();

        assert!(lru.is_empty());
        assert_eq!(lru.peek_oldest(), None);
    }
}
