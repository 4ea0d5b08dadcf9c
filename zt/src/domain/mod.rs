//! Domain types for the task engine
//!
//! A collaborator describes work as a [`Task`] plus [`TaskOptions`]; the
//! engine materializes a [`TaskRecord`] at submission and reports each record's
//! terminal state as exactly one [`TaskResult`].

mod result;
mod task;

pub use result::{Outcome, TaskResult, TaskStatus};
pub use task::{BlockingTaskFn, Priority, Task, TaskFn, TaskOptions, TaskRecord, blocking_task_fn, task_fn};
