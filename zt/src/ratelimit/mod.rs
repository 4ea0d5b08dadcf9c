//! Token-bucket rate limiting
//!
//! One [`RateLimiter`] is shared by every worker. Pooled workers block their
//! thread with [`RateLimiter::acquire_blocking`]; cooperative units suspend with
//! [`RateLimiter::acquire`]. Refill is lazy, computed from elapsed time on each
//! call rather than by a background timer.

mod bucket;
mod limiter;

pub use limiter::{MIN_REFILL_RATE, RateLimiter};
