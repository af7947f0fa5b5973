//! Min-heap of deadlines with lazy invalidation
//!
//! Entries are never removed from the middle of the heap. A heap entry is live
//! only while the node in its slot still carries the same sequence number;
//! anything else is skipped when it reaches the top.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Deadline {
    pub at: Instant,
    pub seq: u64,
    pub slot: usize,
}

#[derive(Default)]
pub(crate) struct ExpiryHeap {
    heap: BinaryHeap<Reverse<Deadline>>,
}

impl ExpiryHeap {
    pub fn push(&mut self, deadline: Deadline) {
        self.heap.push(Reverse(deadline));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Earliest live deadline, discarding stale entries found on top.
    pub fn peek_live(&mut self, is_live: impl Fn(&Deadline) -> bool) -> Option<Instant> {
        while let Some(Reverse(top)) = self.heap.peek() {
            if is_live(top) {
                return Some(top.at);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop the top entry if its deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Deadline> {
        match self.heap.peek() {
            Some(Reverse(top)) if top.at <= now => self.heap.pop().map(|Reverse(d)| d),
            _ => None,
        }
    }

    pub fn rebuild(&mut self, live: impl Iterator<Item = Deadline>) {
        self.heap = live.map(Reverse).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stale_entries_are_skipped_on_peek() {
        let now = Instant::now();
        let mut heap = ExpiryHeap::default();
        heap.push(Deadline {
            at: now + Duration::from_secs(1),
            seq: 1,
            slot: 0,
        });
        heap.push(Deadline {
            at: now + Duration::from_secs(5),
            seq: 2,
            slot: 1,
        });

        let next = heap.peek_live(|d| d.seq != 1);
        assert_eq!(next, Some(now + Duration::from_secs(5)));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn pop_due_respects_now() {
        let now = Instant::now();
        let mut heap = ExpiryHeap::default();
        heap.push(Deadline {
            at: now + Duration::from_secs(2),
            seq: 7,
            slot: 3,
        });

        assert!(heap.pop_due(now).is_none());
        let due = heap.pop_due(now + Duration::from_secs(2)).unwrap();
        assert_eq!((due.seq, due.slot), (7, 3));
    }
}
