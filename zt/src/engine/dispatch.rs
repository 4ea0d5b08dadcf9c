//! Scheduling strategies
//!
//! A [`Dispatcher`] drives queued records to completion. Both strategies share
//! one [`DispatchContext`]: the queue, the rate limiter, the result sink and the
//! runtime that drives timers and I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use super::worker::execute_with_retry;
use crate::config::EngineConfig;
use crate::domain::{TaskRecord, TaskResult};
use crate::error::EngineError;
use crate::ratelimit::RateLimiter;
use crate::scheduler::TaskQueue;

/// Execution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fixed pool of worker threads
    #[default]
    Pooled,
    /// One concurrently polled unit per queued task
    Cooperative,
}

impl Mode {
    /// The dispatcher implementing this mode
    pub fn dispatcher(self) -> Box<dyn Dispatcher> {
        match self {
            Self::Pooled => Box::new(PooledDispatcher),
            Self::Cooperative => Box::new(CooperativeDispatcher),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pooled => write!(f, "pooled"),
            Self::Cooperative => write!(f, "cooperative"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pooled" | "pool" | "threads" => Ok(Self::Pooled),
            "cooperative" | "async" => Ok(Self::Cooperative),
            _ => Err(format!("Unknown mode: {}. Use: pooled or cooperative", s)),
        }
    }
}

/// Shared result collection
///
/// Appends and drains each take the collection's own lock; payload execution
/// never happens under it.
#[derive(Clone, Default)]
pub struct ResultSink {
    results: Arc<Mutex<Vec<TaskResult>>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: TaskResult) {
        self.results.lock().push(result);
    }

    /// Take every collected result, leaving the sink empty
    pub fn drain(&self) -> Vec<TaskResult> {
        std::mem::take(&mut *self.results.lock())
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a dispatcher shares with the engine
#[derive(Clone)]
pub struct DispatchContext {
    pub queue: Arc<TaskQueue>,
    pub limiter: Arc<RateLimiter>,
    pub sink: ResultSink,
    pub config: Arc<EngineConfig>,
    pub runtime: Handle,
}

impl DispatchContext {
    /// Execute one dequeued record and record its result
    async fn complete(&self, record: TaskRecord) {
        let result = execute_with_retry(&record, &self.config).await;
        self.sink.push(result);
    }
}

/// A strategy for draining the queue
pub trait Dispatcher: Send + Sync {
    fn mode(&self) -> Mode;

    /// Run queued records until each has a result
    ///
    /// Must be called from outside any async context.
    fn dispatch(&self, ctx: &DispatchContext) -> Result<(), EngineError>;
}

/// Marks a dequeued record finished even if its worker unwinds
struct DoneGuard<'a>(&'a TaskQueue);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

/// Fixed pool of long-lived OS worker threads
#[derive(Debug, Default, Clone, Copy)]
pub struct PooledDispatcher;

impl PooledDispatcher {
    fn worker_loop(index: usize, ctx: DispatchContext, stop: Arc<AtomicBool>) {
        debug!(index, "PooledDispatcher: worker started");
        let poll = ctx.config.poll_interval();
        loop {
            match ctx.queue.take_timeout(poll) {
                Some(record) => {
                    let _done = DoneGuard(&ctx.queue);
                    // One permit per record, spent whatever the outcome
                    ctx.limiter.acquire_blocking(1);
                    ctx.runtime.block_on(ctx.complete(record));
                }
                None if stop.load(Ordering::Acquire) => break,
                None => {}
            }
        }
        debug!(index, "PooledDispatcher: worker stopped");
    }

    fn stop_and_join(stop: &AtomicBool, queue: &TaskQueue, handles: Vec<JoinHandle<()>>) -> Result<(), EngineError> {
        stop.store(true, Ordering::Release);
        queue.wake_all();

        let mut panicked = None;
        for (index, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(index, "PooledDispatcher: worker panicked");
                if panicked.is_none() {
                    panicked = Some(index);
                }
            }
        }
        match panicked {
            Some(index) => Err(EngineError::WorkerPanicked { index }),
            None => Ok(()),
        }
    }
}

impl Dispatcher for PooledDispatcher {
    fn mode(&self) -> Mode {
        Mode::Pooled
    }

    fn dispatch(&self, ctx: &DispatchContext) -> Result<(), EngineError> {
        let workers = ctx.config.workers;
        info!(workers, queued = ctx.queue.len(), "PooledDispatcher: starting workers");

        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let worker_ctx = ctx.clone();
            let worker_stop = stop.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("zoro-worker-{}", index))
                .spawn(move || Self::worker_loop(index, worker_ctx, worker_stop));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(index, error = %e, "PooledDispatcher: failed to spawn worker");
                    Self::stop_and_join(&stop, &ctx.queue, handles)?;
                    return Err(EngineError::Runtime(e));
                }
            }
        }

        // Released only once every dequeued record has a result
        ctx.queue.join();
        debug!("PooledDispatcher: join barrier released");
        Self::stop_and_join(&stop, &ctx.queue, handles)
    }
}

/// One concurrently polled unit per queued record, all on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct CooperativeDispatcher;

impl CooperativeDispatcher {
    async fn run_unit(ctx: &DispatchContext, record: TaskRecord, bound: Option<Arc<Semaphore>>) {
        let _done = DoneGuard(&ctx.queue);
        let _permit = match bound {
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };
        // One permit per record, spent whatever the outcome
        ctx.limiter.acquire(1).await;
        ctx.complete(record).await;
    }
}

impl Dispatcher for CooperativeDispatcher {
    fn mode(&self) -> Mode {
        Mode::Cooperative
    }

    fn dispatch(&self, ctx: &DispatchContext) -> Result<(), EngineError> {
        let records = ctx.queue.drain_ordered();
        let bound = ctx
            .config
            .bound_cooperative
            .then(|| Arc::new(Semaphore::new(ctx.config.workers)));
        info!(units = records.len(), bounded = bound.is_some(), "CooperativeDispatcher: launching units");

        let units = records
            .into_iter()
            .map(|record| Self::run_unit(ctx, record, bound.clone()));
        ctx.runtime.block_on(futures::future::join_all(units));

        debug!("CooperativeDispatcher: all units resolved");
        Ok(())
    }
}
