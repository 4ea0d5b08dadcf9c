//! Engine error types
//!
//! Payload failures never surface here; they become result records. These are
//! faults of the engine itself or of its configuration.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while configuring or driving the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Failed to build execution runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Worker thread {index} panicked")]
    WorkerPanicked { index: usize },

    #[error("Engine has been shut down")]
    ShutDown,
}

impl EngineError {
    /// Check if this is a rate limit rejection
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, EngineError::RateLimited { .. })
    }

    /// Get the suggested wait if this is a rate limit rejection
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EngineError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
