//! Task capability and the immutable record the scheduler orders

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Priority of a task. Lower values dequeue first.
pub type Priority = i32;

/// A unit of work the engine can invoke without understanding it
///
/// Collaborators capture their arguments in the implementing type. The same
/// payload is re-invoked on retry, so `run` takes `&self`.
#[async_trait]
pub trait Task: Send + Sync {
    /// Execute one attempt
    async fn run(&self) -> eyre::Result<Value>;
}

/// Adapter turning an async closure into a [`Task`]
pub struct TaskFn<F>(F);

/// Wrap an async closure as a [`Task`]
///
/// ```
/// use zoro::domain::task_fn;
///
/// let task = task_fn(|| async { Ok(serde_json::json!({"open": true})) });
/// # let _ = task;
/// ```
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = eyre::Result<Value>> + Send,
{
    TaskFn(f)
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = eyre::Result<Value>> + Send,
{
    async fn run(&self) -> eyre::Result<Value> {
        (self.0)().await
    }
}

/// Adapter running a synchronous closure on the blocking thread pool
pub struct BlockingTaskFn<F>(Arc<F>);

/// Wrap a synchronous closure as a [`Task`]
///
/// Each attempt runs on a blocking thread so the attempt timeout can abandon
/// it. The abandoned thread runs to completion in the background and its
/// result is discarded.
///
/// ```
/// use zoro::domain::blocking_task_fn;
///
/// let task = blocking_task_fn(|| Ok(serde_json::json!({"whois": "..."})));
/// # let _ = task;
/// ```
pub fn blocking_task_fn<F>(f: F) -> BlockingTaskFn<F>
where
    F: Fn() -> eyre::Result<Value> + Send + Sync + 'static,
{
    BlockingTaskFn(Arc::new(f))
}

#[async_trait]
impl<F> Task for BlockingTaskFn<F>
where
    F: Fn() -> eyre::Result<Value> + Send + Sync + 'static,
{
    async fn run(&self) -> eyre::Result<Value> {
        let f = self.0.clone();
        match tokio::task::spawn_blocking(move || f()).await {
            Ok(result) => result,
            // Re-raise so the attempt reports it like any other payload panic
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(eyre::eyre!("blocking task cancelled: {}", e)),
        }
    }
}

/// Submission options for a task
///
/// Unset fields fall back to the engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    pub priority: Priority,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub label: Option<String>,
}

impl TaskOptions {
    /// Options with priority 0 and engine defaults for everything else
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// An immutable description of one schedulable unit of work
///
/// Retries re-execute the same payload; they never create a new record.
#[derive(Clone)]
pub struct TaskRecord {
    pub label: String,
    pub priority: Priority,
    pub max_retries: u32,
    pub timeout: Duration,
    pub payload: Arc<dyn Task>,
}

impl TaskRecord {
    /// Create a new record with fully resolved options
    pub fn new(
        label: impl Into<String>,
        priority: Priority,
        max_retries: u32,
        timeout: Duration,
        payload: Arc<dyn Task>,
    ) -> Self {
        Self {
            label: label.into(),
            priority,
            max_retries,
            timeout,
            payload,
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("label", &self.label)
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
