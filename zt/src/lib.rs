//! Zoro - task execution engine for reconnaissance probes
//!
//! Scan modules hand small units of work to an [`Engine`], which runs them
//! under a shared token-bucket rate limit, in `(priority, submission)` order,
//! with per-attempt timeouts and retries, and collects one result per task.
//!
//! # Modules
//!
//! - [`domain`] - Task capability, task records and result records
//! - [`ratelimit`] - Token bucket shared by every worker
//! - [`scheduler`] - Priority queue with a completion barrier
//! - [`engine`] - Execution strategies and the engine façade
//! - [`probe`] - Port and resolution probes used by the CLI
//! - [`report`] - Text and JSON scan reports
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use zoro::config::Config;
//! use zoro::domain::{TaskOptions, task_fn};
//! use zoro::engine::Engine;
//!
//! let engine = Engine::new(&Config::default())?;
//! engine.submit_with(
//!     task_fn(|| async { Ok(serde_json::json!("pong")) }),
//!     TaskOptions::new().priority(1).max_retries(2),
//! );
//! for result in engine.run()? {
//!     println!("{} -> {}", result.label, result.status());
//! }
//! # Ok::<(), zoro::error::EngineError>(())
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod probe;
pub mod ratelimit;
pub mod report;
pub mod scheduler;

pub use config::Config;
pub use domain::{Outcome, Task, TaskOptions, TaskResult, TaskStatus, blocking_task_fn, task_fn};
pub use engine::{Engine, Mode};
pub use error::EngineError;
