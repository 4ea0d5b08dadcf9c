//! Token bucket arithmetic

use std::time::{Duration, Instant};

/// Bucket state guarded by the limiter's mutex
///
/// Invariant: `0 <= tokens <= capacity` after every operation.
#[derive(Debug, Clone)]
pub(crate) struct Bucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_update: Instant,
}

impl Bucket {
    /// A full bucket
    pub(crate) fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_update: now,
        }
    }

    pub(crate) fn capacity(&self) -> f64 {
        self.capacity
    }

    pub(crate) fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Add tokens for the time elapsed since the last update
    pub(crate) fn refill(&mut self, now: Instant) {
        let Some(elapsed) = now.checked_duration_since(self.last_update) else {
            return;
        };
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    /// Debit `cost` tokens, or return how long until they will be available
    pub(crate) fn reserve(&mut self, cost: f64, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            return Ok(());
        }
        let wait = (cost - self.tokens) / self.refill_rate;
        Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
    }

    /// Tokens available at `now`
    pub(crate) fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }
}
