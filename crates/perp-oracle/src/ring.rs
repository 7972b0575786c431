//! Fixed-capacity circular buffer with a monotonically increasing write count.
//!
//! The buffer grows until it holds `capacity` items; after that each push
//! overwrites the oldest slot. The slot written by the `n`-th push (0-based)
//! is `n mod capacity`, so the newest item always sits at
//! `(total - 1) mod capacity`.

use std::num::NonZeroUsize;

/// A bounded ring of `T` that keeps the most recent `capacity` items.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: NonZeroUsize,
    total: u64,
}

impl<T> RingBuffer<T> {
    /// Create an empty ring.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
            total: 0,
        }
    }

    /// Maximum number of retained items.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of pushes ever made. Never decreases.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of retained items, `min(total, capacity)`.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing was ever pushed.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Whether at least one item has been overwritten.
    pub fn is_wrapped(&self) -> bool {
        self.total > self.capacity.get() as u64
    }

    fn slot_of(&self, sequence: u64) -> usize {
        (sequence % self.capacity.get() as u64) as usize
    }

    /// Slot the next push will write.
    pub fn write_slot(&self) -> usize {
        self.slot_of(self.total)
    }

    /// Append an item, overwriting the oldest once full.
    ///
    /// Returns the new total.
    pub fn push(&mut self, item: T) -> u64 {
        let slot = self.write_slot();
        if self.slots.len() < self.capacity.get() {
            self.slots.push(item);
        } else {
            self.slots[slot] = item;
        }
        self.total += 1;
        self.total
    }

    /// Item written `age` pushes ago; `age == 0` is the newest.
    pub fn get(&self, age: usize) -> Option<&T> {
        if age >= self.len() {
            return None;
        }
        let sequence = self.total - 1 - age as u64;
        self.slots.get(self.slot_of(sequence))
    }

    /// Most recently pushed item.
    pub fn newest(&self) -> Option<&T> {
        self.get(0)
    }

    /// Oldest retained item.
    pub fn oldest(&self) -> Option<&T> {
        self.get(self.len().checked_sub(1)?)
    }

    /// Replace the newest item in place without advancing the write count.
    ///
    /// Returns the replaced item, or `None` (and drops `item`) if the ring is
    /// empty.
    pub fn replace_newest(&mut self, item: T) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let slot = self.slot_of(self.total - 1);
        self.slots
            .get_mut(slot)
            .map(|current| std::mem::replace(current, item))
    }

    /// Retained items from newest to oldest, wrapping through slot 0.
    ///
    /// Visits at most `capacity` items.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).filter_map(move |age| self.get(age))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: usize) -> RingBuffer<u32> {
        RingBuffer::new(NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[test]
    fn test_empty_ring() {
        let r = ring(4);
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
        assert_eq!(r.newest(), None);
        assert_eq!(r.oldest(), None);
        assert_eq!(r.write_slot(), 0);
    }

    #[test]
    fn test_fill_without_wrap() {
        let mut r = ring(4);
        for v in 1..=3 {
            r.push(v);
        }
        assert_eq!(r.len(), 3);
        assert_eq!(r.total(), 3);
        assert!(!r.is_wrapped());
        assert_eq!(r.newest(), Some(&3));
        assert_eq!(r.oldest(), Some(&1));
        assert_eq!(r.write_slot(), 3);
    }

    #[test]
    fn test_wraparound_keeps_latest_capacity_items() {
        let mut r = ring(4);
        for v in 1..=6 {
            r.push(v);
        }
        assert_eq!(r.len(), 4);
        assert_eq!(r.total(), 6);
        assert!(r.is_wrapped());
        assert_eq!(r.write_slot(), 2);
        assert_eq!(r.newest(), Some(&6));
        assert_eq!(r.oldest(), Some(&3));
        let seen: Vec<u32> = r.iter_newest_first().copied().collect();
        assert_eq!(seen, vec![6, 5, 4, 3]);
    }

    #[test]
    fn test_exactly_full_is_not_wrapped() {
        let mut r = ring(3);
        for v in 0..3 {
            r.push(v);
        }
        assert!(!r.is_wrapped());
        assert_eq!(r.oldest(), Some(&0));
        r.push(3);
        assert!(r.is_wrapped());
        assert_eq!(r.oldest(), Some(&1));
    }

    #[test]
    fn test_get_by_age() {
        let mut r = ring(3);
        for v in 10..15 {
            r.push(v);
        }
        assert_eq!(r.get(0), Some(&14));
        assert_eq!(r.get(2), Some(&12));
        assert_eq!(r.get(3), None);
    }

    #[test]
    fn test_replace_newest() {
        let mut r = ring(2);
        assert_eq!(r.replace_newest(9), None);
        assert!(r.is_empty());

        r.push(1);
        r.push(2);
        r.push(3);
        assert_eq!(r.replace_newest(30), Some(3));
        assert_eq!(r.newest(), Some(&30));
        assert_eq!(r.total(), 3);
    }

    #[test]
    fn test_capacity_one() {
        let mut r = ring(1);
        r.push(5);
        r.push(6);
        assert_eq!(r.len(), 1);
        assert_eq!(r.newest(), Some(&6));
        assert_eq!(r.oldest(), Some(&6));
    }
}
