//! Timer queue
//!
//! BinaryHeap (min-heap) keyed by deadline, ties broken by start order.
//! Stopping or restarting a timer does not touch the heap: the handle's
//! current sequence number moves on and the old entry is skipped when it
//! surfaces.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::handle::HandleId;

#[derive(Clone, Copy, Debug)]
pub(crate) struct TimerEntry {
    pub deadline: Instant,
    pub seq: u64,
    pub id: HandleId,
}

// Min-heap ordering (earliest deadline, then lowest seq, first)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 1,
        }
    }

    /// Schedule `id` at `deadline`; returns the entry's sequence number
    pub fn push(&mut self, id: HandleId, deadline: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry { deadline, seq, id });
        seq
    }

    /// Sequence number the next `push` will hand out
    #[inline]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    #[inline]
    pub fn peek(&self) -> Option<TimerEntry> {
        self.heap.peek().copied()
    }

    #[inline]
    pub fn pop(&mut self) -> Option<TimerEntry> {
        self.heap.pop()
    }

    /// Drop stale entries from the top until `is_live` accepts one
    pub fn purge_stale(&mut self, mut is_live: impl FnMut(&TimerEntry) -> bool) {
        while let Some(top) = self.heap.peek() {
            if is_live(top) {
                break;
            }
            self.heap.pop();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(n: u64) -> HandleId {
        HandleId::from_token(n)
    }

    #[test]
    fn test_earliest_deadline_first() {
        let base = Instant::now();
        let mut q = TimerQueue::new();
        q.push(id(1), base + Duration::from_millis(30));
        q.push(id(2), base + Duration::from_millis(10));
        q.push(id(3), base + Duration::from_millis(20));

        let order: Vec<u32> = std::iter::from_fn(|| q.pop()).map(|e| e.id.index()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_equal_deadlines_keep_start_order() {
        let at = Instant::now();
        let mut q = TimerQueue::new();
        for n in 0..5 {
            q.push(id(n), at);
        }
        let order: Vec<u32> = std::iter::from_fn(|| q.pop()).map(|e| e.id.index()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_purge_stale() {
        let base = Instant::now();
        let mut q = TimerQueue::new();
        let stale = q.push(id(1), base);
        q.push(id(2), base + Duration::from_millis(5));

        q.purge_stale(|e| e.seq != stale);
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek().map(|e| e.id.index()), Some(2));
    }
}
