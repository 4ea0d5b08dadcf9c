//! Engine façade
//!
//! The engine owns the queue, the rate limiter, the result sink and the tokio
//! runtime every payload runs on. Its API is blocking: call it from ordinary
//! threads, never from inside an async context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

use super::dispatch::{DispatchContext, Mode, ResultSink};
use super::worker::execute_once;
use crate::config::{Config, EngineConfig};
use crate::domain::{Outcome, Task, TaskOptions, TaskRecord, TaskResult, TaskStatus};
use crate::error::EngineError;
use crate::ratelimit::RateLimiter;
use crate::scheduler::{QueueStats, TaskQueue};

/// Task execution engine
pub struct Engine {
    config: Arc<EngineConfig>,
    queue: Arc<TaskQueue>,
    limiter: Arc<RateLimiter>,
    sink: ResultSink,
    runtime: Option<Runtime>,
    run_lock: Mutex<()>,
    next_label: AtomicU64,
}

impl Engine {
    /// Create an engine with its own rate limiter built from `config`
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        config.validate()?;
        let limiter = RateLimiter::from_config(&config.rate_limit)?;
        Self::with_limiter(config.engine.clone(), Arc::new(limiter))
    }

    /// Create an engine sharing an existing rate limiter
    pub fn with_limiter(config: EngineConfig, limiter: Arc<RateLimiter>) -> Result<Self, EngineError> {
        debug!(?config, "Engine::with_limiter: called");
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("zoro-runtime")
            .enable_all()
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(TaskQueue::new()),
            limiter,
            sink: ResultSink::new(),
            runtime: Some(runtime),
            run_lock: Mutex::new(()),
            next_label: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Default execution strategy for [`Engine::run`]
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Enqueue a payload at priority 0 with the configured retry and timeout defaults
    pub fn submit(&self, task: impl Task + 'static) {
        self.submit_arc(Arc::new(task), TaskOptions::default());
    }

    /// Enqueue a payload with explicit options
    pub fn submit_with(&self, task: impl Task + 'static, options: TaskOptions) {
        self.submit_arc(Arc::new(task), options);
    }

    /// Enqueue a shared payload
    pub fn submit_arc(&self, task: Arc<dyn Task>, options: TaskOptions) {
        let label = options
            .label
            .unwrap_or_else(|| format!("task-{}", self.next_label.fetch_add(1, Ordering::Relaxed)));
        let record = TaskRecord::new(
            label,
            options.priority,
            options.max_retries.unwrap_or(self.config.max_retries),
            options.timeout.unwrap_or_else(|| self.config.timeout()),
            task,
        );
        debug!(label = %record.label, priority = record.priority, "Engine::submit: queued");
        self.queue.submit(record);
    }

    /// Run every queued task with the configured mode
    pub fn run(&self) -> Result<Vec<TaskResult>, EngineError> {
        self.run_with(self.config.mode)
    }

    /// Run every queued task with `mode` and return the results of this run
    ///
    /// Returns once each task has exactly one result. Results are drained, so
    /// a later [`Engine::drain_results`] does not see them again.
    pub fn run_with(&self, mode: Mode) -> Result<Vec<TaskResult>, EngineError> {
        let _running = self.run_lock.lock();
        let ctx = DispatchContext {
            queue: self.queue.clone(),
            limiter: self.limiter.clone(),
            sink: self.sink.clone(),
            config: self.config.clone(),
            runtime: self.handle()?,
        };

        let queued = self.queue.len();
        info!(%mode, queued, "Engine::run: starting");
        let start = Instant::now();

        mode.dispatcher().dispatch(&ctx)?;

        let results = self.sink.drain();
        let count = |status: TaskStatus| results.iter().filter(|r| r.status() == status).count();
        info!(
            %mode,
            total = results.len(),
            success = count(TaskStatus::Success),
            error = count(TaskStatus::Error),
            timeout = count(TaskStatus::Timeout),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Engine::run: finished"
        );
        Ok(results)
    }

    /// Run one payload directly, bypassing the queue and the rate limiter
    ///
    /// Uses the configured timeout when `timeout` is `None`. Payload failures
    /// come back as [`Outcome::Error`], never as `Err`.
    pub fn execute_one(&self, task: impl Task, timeout: Option<Duration>) -> Result<Outcome, EngineError> {
        let timeout = timeout.unwrap_or_else(|| self.config.timeout());
        debug!(?timeout, "Engine::execute_one: called");
        let handle = self.handle()?;
        Ok(handle.block_on(execute_once(&task, timeout)))
    }

    /// Take every result collected so far; a second call returns nothing new
    pub fn drain_results(&self) -> Vec<TaskResult> {
        self.sink.drain()
    }

    /// Tasks submitted that do not have a result yet
    pub fn pending(&self) -> usize {
        self.queue.unfinished()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Release the runtime, giving in-flight work the configured grace period
    pub fn shutdown(mut self) {
        self.release();
    }

    fn handle(&self) -> Result<Handle, EngineError> {
        self.runtime
            .as_ref()
            .map(|runtime| runtime.handle().clone())
            .ok_or(EngineError::ShutDown)
    }

    fn release(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let pending = self.queue.unfinished();
        if pending > 0 {
            warn!(pending, "Engine::shutdown: tasks never ran");
        }
        // Waiting is not allowed on an async worker thread
        if Handle::try_current().is_ok() {
            warn!("Engine::shutdown: inside an async context, not waiting for in-flight work");
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(self.config.shutdown_grace());
        }
        debug!("Engine::shutdown: runtime released");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("queued", &self.queue.len())
            .field("results", &self.sink.len())
            .field("running", &self.runtime.is_some())
            .finish()
    }
}
