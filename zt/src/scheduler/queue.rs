//! Queue entry ordering and statistics

use std::cmp::Ordering;

use crate::domain::TaskRecord;

/// A record waiting in the queue, stamped with its submission sequence
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub seq: u64,
    pub record: TaskRecord,
}

impl QueuedTask {
    pub fn new(seq: u64, record: TaskRecord) -> Self {
        Self { seq, record }
    }
}

impl Eq for QueuedTask {}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower priority value first, then earlier submission
        other
            .record
            .priority
            .cmp(&self.record.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Statistics for the queue
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub total_submitted: u64,
    pub total_dequeued: u64,
    pub total_completed: u64,
    pub peak_depth: usize,
}
