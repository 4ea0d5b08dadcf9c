//! Priority scheduling for submitted tasks
//!
//! Orders pending records by `(priority, submission sequence)` and tracks how
//! many dequeued records still lack a result, so the engine can wait on a
//! join barrier rather than on an empty queue.

mod core;
mod queue;

pub use self::core::TaskQueue;
pub use queue::{QueueStats, QueuedTask};
