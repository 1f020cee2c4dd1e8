//! Timer heap: sleeping tasks ordered by wake-up deadline.
//!
//! A binary min-heap keyed on `(deadline, sequence)`. The sequence number is
//! a mandatory tie-breaker: two entries with equal deadlines still need a
//! total order, and tasks themselves are not comparable.

use crate::task::Task;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    task: Box<dyn Task>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the std max-heap pops the earliest (deadline, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of `(deadline, task)` entries, earliest deadline first.
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Inserts a sleeping task, assigning it the next sequence number.
    pub(crate) fn push(&mut self, deadline: Instant, task: Box<dyn Task>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(TimerEntry {
            deadline,
            seq,
            task,
        });
    }

    /// Returns the earliest pending deadline, if any.
    pub(crate) fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Removes and returns every task whose deadline has passed, in
    /// ascending `(deadline, seq)` order.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<Box<dyn Task>> {
        let mut expired = Vec::new();

        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                expired.push(entry.task);
            }
        }

        expired
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
