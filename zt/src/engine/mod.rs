//! Task execution engine
//!
//! The [`Engine`] façade accepts tasks, orders them through the scheduler
//! queue, and runs them with one of two [`Dispatcher`] strategies:
//!
//! - [`Mode::Pooled`]: a fixed set of OS worker threads sharing the queue
//! - [`Mode::Cooperative`]: one concurrently polled unit per queued task on a
//!   single scheduling thread
//!
//! Both strategies share the same queue, rate limiter, result collection and
//! retry/timeout policy.

mod core;
mod dispatch;
mod worker;

pub use self::core::Engine;
pub use dispatch::{CooperativeDispatcher, DispatchContext, Dispatcher, Mode, PooledDispatcher, ResultSink};
pub use worker::{execute_once, execute_with_retry};
