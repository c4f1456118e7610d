use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Bounded, time-to-live message-id deduplication set. The corpus doesn't
/// import a third-party LRU crate for this shape, so it's reimplemented
/// directly over a `HashMap` + `VecDeque` insertion-order ring.
pub struct SeenSet {
    capacity: usize,
    ttl: Duration,
    expires_at: HashMap<String, Instant>,
    order: VecDeque<String>,
}

impl SeenSet {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl, expires_at: HashMap::new(), order: VecDeque::new() }
    }

    /// Returns `true` if `id` had not been seen (or had expired), inserting
    /// it; returns `false` if `id` is a live duplicate. A duplicate is
    /// dropped by the caller without delivery or relay (spec §4.3).
    pub fn insert_if_new(&mut self, id: &str) -> bool {
        let now = Instant::now();
        self.evict_expired(now);

        if let Some(expiry) = self.expires_at.get(id) {
            if *expiry > now {
                return false;
            }
        }

        self.expires_at.insert(id.to_string(), now + self.ttl);
        self.order.push_back(id.to_string());
        self.evict_over_capacity();
        true
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(front) = self.order.front() {
            match self.expires_at.get(front) {
                Some(expiry) if *expiry <= now => {
                    let id = self.order.pop_front().unwrap();
                    self.expires_at.remove(&id);
                }
                _ => break,
            }
        }
    }

    fn evict_over_capacity(&mut self) {
        while self.order.len() > self.capacity {
            if let Some(id) = self.order.pop_front() {
                self.expires_at.remove(&id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_is_new_second_is_duplicate() {
        let mut seen = SeenSet::new(16, Duration::from_secs(60));
        assert!(seen.insert_if_new("m1"));
        assert!(!seen.insert_if_new("m1"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut seen = SeenSet::new(2, Duration::from_secs(60));
        assert!(seen.insert_if_new("a"));
        assert!(seen.insert_if_new("b"));
        assert!(seen.insert_if_new("c"));
        assert_eq!(seen.len(), 2);
        // "a" was evicted, so it is treated as new again.
        assert!(seen.insert_if_new("a"));
    }

    #[test]
    fn expired_entry_is_treated_as_new() {
        let mut seen = SeenSet::new(16, Duration::from_millis(10));
        assert!(seen.insert_if_new("m1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(seen.insert_if_new("m1"));
    }
}
