//! Attempt execution with timeout and retry

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::domain::{Outcome, Task, TaskRecord, TaskResult};

/// Result of a single invocation of a payload
#[derive(Debug)]
enum Attempt {
    Succeeded(Value),
    Failed(String),
    TimedOut,
}

/// Invoke the payload once, abandoning it when `timeout` elapses
///
/// Dropping the timed-out future cancels the underlying work. A payload that
/// blocks instead of yielding can only be judged once it returns, so any
/// attempt finishing past its deadline is also a timeout. Panics are caught
/// and reported as failures.
async fn attempt(task: &dyn Task, timeout: Duration) -> Attempt {
    let started = Instant::now();
    let run = AssertUnwindSafe(task.run()).catch_unwind();
    let finished = tokio::time::timeout(timeout, run).await;
    if started.elapsed() > timeout {
        debug!(?timeout, elapsed = ?started.elapsed(), "attempt: finished past deadline");
        return Attempt::TimedOut;
    }
    match finished {
        Err(_) => Attempt::TimedOut,
        Ok(Err(panic)) => Attempt::Failed(format!("task panicked: {}", panic_message(panic.as_ref()))),
        Ok(Ok(Err(e))) => Attempt::Failed(format!("{:#}", e)),
        Ok(Ok(Ok(value))) => Attempt::Succeeded(value),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run a payload once under `timeout`, without retries
pub async fn execute_once(task: &dyn Task, timeout: Duration) -> Outcome {
    match attempt(task, timeout).await {
        Attempt::Succeeded(result) => Outcome::Success { result },
        Attempt::Failed(error) => {
            warn!(%error, "execute_once: task failed");
            Outcome::Error { error }
        }
        Attempt::TimedOut => {
            warn!(?timeout, "execute_once: task timed out");
            Outcome::timed_out(timeout)
        }
    }
}

/// Execute a record to a terminal result
///
/// Execution errors are retried in place up to `record.max_retries` times.
/// A timeout is terminal and consumes the record immediately.
pub async fn execute_with_retry(record: &TaskRecord, config: &EngineConfig) -> TaskResult {
    debug!(label = %record.label, priority = record.priority, "execute_with_retry: called");
    let started = Instant::now();
    let mut attempts = 0u32;

    let outcome = loop {
        attempts += 1;
        match attempt(record.payload.as_ref(), record.timeout).await {
            Attempt::Succeeded(result) => {
                debug!(label = %record.label, attempts, "execute_with_retry: succeeded");
                break Outcome::Success { result };
            }
            Attempt::TimedOut => {
                warn!(label = %record.label, timeout = ?record.timeout, attempts, "Task timed out");
                break Outcome::timed_out(record.timeout);
            }
            Attempt::Failed(error) if attempts <= record.max_retries => {
                debug!(label = %record.label, attempts, %error, "execute_with_retry: retrying after failure");
                if let Some(delay) = config.retry_delay(attempts) {
                    debug!(label = %record.label, ?delay, "execute_with_retry: backing off");
                    tokio::time::sleep(delay).await;
                }
            }
            Attempt::Failed(error) => {
                warn!(label = %record.label, attempts, %error, "Task failed");
                break Outcome::Error { error };
            }
        }
    };

    TaskResult {
        priority: record.priority,
        label: record.label.clone(),
        attempts,
        elapsed_ms: started.elapsed().as_millis() as u64,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskStatus, blocking_task_fn, task_fn};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record(task: impl Task + 'static, max_retries: u32, timeout: Duration) -> TaskRecord {
        TaskRecord::new("test", 2, max_retries, timeout, Arc::new(task))
    }

    /// Fails `failures` times, then returns the attempt count
    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> impl Task {
        task_fn(move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    eyre::bail!("attempt {} failed", n);
                }
                Ok(json!(n))
            }
        })
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute_with_retry(&record(flaky(0, calls.clone()), 3, Duration::from_secs(1)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.priority, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute_with_retry(&record(flaky(2, calls.clone()), 2, Duration::from_secs(1)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Success);
        assert_eq!(result.outcome.result(), Some(&json!(3)));
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute_with_retry(&record(flaky(u32::MAX, calls.clone()), 2, Duration::from_secs(1)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Error);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.outcome.error(), Some("attempt 3 failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let slow = task_fn(move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Value::Null)
            }
        });

        let result = execute_with_retry(&record(slow, 5, Duration::from_millis(50)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Timeout);
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.outcome.error().unwrap().contains("50ms"));
    }

    #[tokio::test]
    async fn test_null_output_is_success() {
        let empty = task_fn(|| async { Ok(Value::Null) });
        let result = execute_with_retry(&record(empty, 0, Duration::from_secs(1)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Success);
        assert_eq!(result.outcome.result(), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let boom = task_fn(|| async {
            if true {
                panic!("exploded");
            }
            Ok(Value::Null)
        });
        let result = execute_with_retry(&record(boom, 1, Duration::from_secs(1)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Error);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.outcome.error(), Some("task panicked: exploded"));
    }

    #[tokio::test]
    async fn test_backoff_delays_retries() {
        let config = EngineConfig {
            retry_backoff_ms: 30,
            retry_backoff_cap_ms: 1_000,
            ..Default::default()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let result = execute_with_retry(&record(flaky(2, calls), 2, Duration::from_secs(1)), &config).await;

        assert_eq!(result.status(), TaskStatus::Success);
        // 30ms + 60ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_error_message_includes_context_chain() {
        use eyre::WrapErr;
        let task = task_fn(|| async {
            Err::<Value, _>(std::io::Error::other("refused")).wrap_err("connect failed")
        });

        let outcome = execute_once(&task, Duration::from_secs(1)).await;
        let error = outcome.error().unwrap();
        assert!(error.contains("connect failed"));
        assert!(error.contains("refused"));
    }

    #[tokio::test]
    async fn test_execute_once_timeout() {
        let slow = task_fn(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        });
        let outcome = execute_once(&slow, Duration::from_millis(20)).await;
        assert_eq!(outcome.status(), TaskStatus::Timeout);
    }

    #[tokio::test]
    async fn test_late_finish_of_blocking_body_is_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        // Blocks the poll instead of yielding, so the timer cannot interrupt it
        let stubborn = task_fn(move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                Ok(json!("late"))
            }
        });

        let result = execute_with_retry(&record(stubborn, 3, Duration::from_millis(50)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Timeout);
        assert_eq!(result.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocking_task_is_abandoned_at_timeout() {
        let sleeper = blocking_task_fn(|| {
            std::thread::sleep(Duration::from_secs(2));
            Ok(json!("late"))
        });

        let start = Instant::now();
        let outcome = execute_once(&sleeper, Duration::from_millis(100)).await;

        assert_eq!(outcome.status(), TaskStatus::Timeout);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_blocking_task_panic_becomes_error() {
        let boom = blocking_task_fn(|| {
            if true {
                panic!("socket exploded");
            }
            Ok(Value::Null)
        });
        let result = execute_with_retry(&record(boom, 0, Duration::from_secs(1)), &EngineConfig::default()).await;

        assert_eq!(result.status(), TaskStatus::Error);
        assert_eq!(result.outcome.error(), Some("task panicked: socket exploded"));
    }
}
