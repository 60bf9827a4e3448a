//! Fixed-capacity correlation buffer
//!
//! Correlates paired events (seen, then resolved) by string key without
//! unbounded growth. Storage is a ring of `capacity` slots addressed by a
//! monotonically increasing sequence number; a side index maps each key to
//! the stack of live slots holding it, so `pop` is LIFO per key. When the
//! ring wraps, the overwritten entry disappears from the index immediately.

use std::collections::HashMap;

struct Slot<T> {
    key: String,
    value: T,
}

/// Ring buffer with per-key LIFO retrieval.
pub struct CorrelationBuffer<T> {
    slots: Vec<Option<Slot<T>>>,
    index: HashMap<String, Vec<usize>>,
    counter: u64,
}

impl<T> CorrelationBuffer<T> {
    /// Create a buffer holding at most `capacity` live entries.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "correlation buffer capacity must be non-zero");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            index: HashMap::new(),
            counter: 0,
        }
    }

    /// Remove and return the most recent live entry for `key`.
    pub fn pop(&mut self, key: &str) -> Option<T> {
        loop {
            let (slot_pos, now_empty) = {
                let stack = self.index.get_mut(key)?;
                let pos = stack.pop();
                (pos, stack.is_empty())
            };
            if now_empty {
                self.index.remove(key);
            }
            let slot_pos = slot_pos?;

            // Skip stale positions whose slot was since reused.
            match &self.slots[slot_pos] {
                Some(slot) if slot.key == key => {
                    return self.slots[slot_pos].take().map(|s| s.value);
                }
                _ => continue,
            }
        }
    }

    /// Drop every entry and reset the sequence counter.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.index.clear();
        self.counter = 0;
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T: Default> CorrelationBuffer<T> {
    /// Insert a fresh default value under `key`, evicting the oldest entry
    /// when the ring is full, and return a handle for filling it in.
    pub fn push(&mut self, key: &str) -> &mut T {
        let slot_pos = (self.counter % self.slots.len() as u64) as usize;
        self.counter += 1;

        // Evict whatever occupied this slot and unlink it from the index.
        if let Some(old) = self.slots[slot_pos].take() {
            if let Some(stack) = self.index.get_mut(&old.key) {
                stack.retain(|&pos| pos != slot_pos);
                if stack.is_empty() {
                    self.index.remove(&old.key);
                }
            }
        }

        self.index
            .entry(key.to_string())
            .or_default()
            .push(slot_pos);

        let slot = self.slots[slot_pos].insert(Slot {
            key: key.to_string(),
            value: T::default(),
        });
        &mut slot.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_returns_value() {
        let mut buf: CorrelationBuffer<u32> = CorrelationBuffer::new(4);
        *buf.push("req-1") = 42;
        assert_eq!(buf.pop("req-1"), Some(42));
        assert_eq!(buf.pop("req-1"), None);
    }

    #[test]
    fn pop_is_lifo_per_key() {
        let mut buf: CorrelationBuffer<u32> = CorrelationBuffer::new(8);
        *buf.push("k") = 1;
        *buf.push("k") = 2;
        *buf.push("other") = 99;
        *buf.push("k") = 3;
        assert_eq!(buf.pop("k"), Some(3));
        assert_eq!(buf.pop("k"), Some(2));
        assert_eq!(buf.pop("other"), Some(99));
        assert_eq!(buf.pop("k"), Some(1));
        assert_eq!(buf.pop("k"), None);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut buf: CorrelationBuffer<u64> = CorrelationBuffer::new(4);
        for i in 0..6u64 {
            *buf.push("k") = i;
        }
        assert_eq!(buf.len(), 4);
        // 0 and 1 were overwritten by 4 and 5.
        assert_eq!(buf.pop("k"), Some(5));
        assert_eq!(buf.pop("k"), Some(4));
        assert_eq!(buf.pop("k"), Some(3));
        assert_eq!(buf.pop("k"), Some(2));
        assert_eq!(buf.pop("k"), None);
    }

    #[test]
    fn interleaved_keys_survive_heavy_overflow() {
        let capacity = 8;
        let mut buf: CorrelationBuffer<u64> = CorrelationBuffer::new(capacity);
        // Four full wraps, alternating two keys.
        for i in 0..(capacity as u64 * 4) {
            let key = if i % 2 == 0 { "a" } else { "b" };
            *buf.push(key) = i;
        }
        // Only the most recent capacity/2 entries per key remain, newest first.
        let survivors = capacity as u64 * 4 - capacity as u64;
        let mut expect_a: Vec<u64> =
            (survivors..capacity as u64 * 4).filter(|i| i % 2 == 0).collect();
        let mut expect_b: Vec<u64> =
            (survivors..capacity as u64 * 4).filter(|i| i % 2 == 1).collect();
        expect_a.reverse();
        expect_b.reverse();
        for v in expect_a {
            assert_eq!(buf.pop("a"), Some(v));
        }
        for v in expect_b {
            assert_eq!(buf.pop("b"), Some(v));
        }
        assert_eq!(buf.pop("a"), None);
        assert_eq!(buf.pop("b"), None);
    }

    #[test]
    fn read_side_works_without_default_payloads() {
        // Only `push` needs `Default`; the rest of the API does not.
        struct Opaque;
        let mut buf: CorrelationBuffer<Opaque> = CorrelationBuffer::new(4);
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 4);
        assert!(buf.pop("k").is_none());
        buf.clear();
    }

    #[test]
    fn clear_resets_everything() {
        let mut buf: CorrelationBuffer<u32> = CorrelationBuffer::new(4);
        *buf.push("k") = 7;
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.pop("k"), None);
        // Slots fill from the start again.
        *buf.push("k") = 8;
        assert_eq!(buf.pop("k"), Some(8));
    }
}
