//! Task queue implementation

use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use super::queue::{QueueStats, QueuedTask};
use crate::domain::TaskRecord;

/// Internal state protected by mutex
struct QueueInner {
    /// Pending records, lowest `(priority, seq)` on top
    heap: BinaryHeap<QueuedTask>,

    /// Next submission sequence number
    next_seq: u64,

    /// Submitted records that have not yet been marked done
    unfinished: usize,

    /// Statistics
    stats: QueueStats,
}

impl QueueInner {
    fn pop(&mut self) -> Option<TaskRecord> {
        let queued = self.heap.pop()?;
        self.stats.total_dequeued += 1;
        debug!(seq = queued.seq, label = %queued.record.label, priority = queued.record.priority, "TaskQueue: dequeued");
        Some(queued.record)
    }
}

/// Priority queue of task records with a completion barrier
///
/// Every record handed out by `take*` or `drain_ordered` must be followed by
/// exactly one [`TaskQueue::task_done`] once its result has been recorded.
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    finished: Condvar,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                unfinished: 0,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
            finished: Condvar::new(),
        }
    }

    /// Insert a record, returning its submission sequence number
    pub fn submit(&self, record: TaskRecord) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        debug!(seq, label = %record.label, priority = record.priority, "TaskQueue::submit: called");
        inner.heap.push(QueuedTask::new(seq, record));
        inner.unfinished += 1;
        inner.stats.total_submitted += 1;
        inner.stats.peak_depth = inner.stats.peak_depth.max(inner.heap.len());
        drop(inner);

        self.available.notify_one();
        seq
    }

    /// Remove the next record without waiting
    pub fn take(&self) -> Option<TaskRecord> {
        self.inner.lock().pop()
    }

    /// Remove the next record, waiting up to `wait` for one to be submitted
    pub fn take_timeout(&self, wait: Duration) -> Option<TaskRecord> {
        let deadline = Instant::now() + wait;
        let mut inner = self.inner.lock();
        loop {
            if let Some(record) = inner.pop() {
                return Some(record);
            }
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                return inner.pop();
            }
        }
    }

    /// Remove every pending record in dequeue order
    pub fn drain_ordered(&self) -> Vec<TaskRecord> {
        let mut inner = self.inner.lock();
        let mut drained = Vec::with_capacity(inner.heap.len());
        while let Some(record) = inner.pop() {
            drained.push(record);
        }
        drained
    }

    /// Mark one dequeued record as finished
    pub fn task_done(&self) {
        let mut inner = self.inner.lock();
        if inner.unfinished == 0 {
            error!("TaskQueue::task_done: called more times than records were submitted");
            return;
        }
        inner.unfinished -= 1;
        inner.stats.total_completed += 1;
        if inner.unfinished == 0 {
            debug!("TaskQueue::task_done: all records finished");
            self.finished.notify_all();
        }
    }

    /// Block until every submitted record has been marked done
    pub fn join(&self) {
        let mut inner = self.inner.lock();
        while inner.unfinished > 0 {
            self.finished.wait(&mut inner);
        }
    }

    /// Like [`TaskQueue::join`] but gives up after `wait`; returns whether the barrier released
    pub fn join_timeout(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        let mut inner = self.inner.lock();
        while inner.unfinished > 0 {
            if self.finished.wait_until(&mut inner, deadline).timed_out() {
                return inner.unfinished == 0;
            }
        }
        true
    }

    /// Wake every thread blocked in `take_timeout`
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    /// Number of records waiting to be dequeued
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of submitted records without a recorded result
    pub fn unfinished(&self) -> usize {
        self.inner.lock().unfinished
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats.clone()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
