//! Result records produced by the engine

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::Priority;

/// Terminal status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Error,
    Timeout,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Outcome of executing a payload: `{status, result|error}`
///
/// `result` is present only on success and `error` only otherwise. An empty or
/// null payload output is still a success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { result: Value },
    Error { error: String },
    Timeout { error: String },
}

impl Outcome {
    /// Outcome for an attempt that exceeded its time budget
    pub fn timed_out(timeout: Duration) -> Self {
        Self::Timeout {
            error: format!("Task timed out after {:?}", timeout),
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Success { .. } => TaskStatus::Success,
            Self::Error { .. } => TaskStatus::Error,
            Self::Timeout { .. } => TaskStatus::Timeout,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { error } | Self::Timeout { error } => Some(error),
            Self::Success { .. } => None,
        }
    }
}

/// The terminal record of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Copied from the originating record for correlation
    pub priority: Priority,
    pub label: String,
    /// Number of times the payload was invoked
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TaskResult {
    pub fn status(&self) -> TaskStatus {
        self.outcome.status()
    }
}
