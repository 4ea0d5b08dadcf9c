//! Shared rate limiter with blocking, suspending and fail-fast acquisition

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::bucket::Bucket;
use crate::config::RateLimitConfig;
use crate::error::EngineError;

/// Waits longer than this are reported
const DEFAULT_SLOW_WAIT: Duration = Duration::from_secs(1);

/// Minimum spacing between slow-wait reports
const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Slowest accepted refill: one token every 1000 seconds
pub const MIN_REFILL_RATE: f64 = 0.001;

/// Token-bucket limiter shared by all workers of an engine
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    slow_wait: Duration,
    warn_interval: Duration,
    last_warned: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a full bucket holding `capacity` tokens, refilled at `refill_rate` tokens/s
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, EngineError> {
        debug!(capacity, refill_rate, "RateLimiter::new: called");
        if !capacity.is_finite() || capacity < 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "rate limit capacity must be at least 1, got {}",
                capacity
            )));
        }
        if !refill_rate.is_finite() || refill_rate < MIN_REFILL_RATE {
            return Err(EngineError::InvalidConfig(format!(
                "rate limit refill rate must be at least {}, got {}",
                MIN_REFILL_RATE, refill_rate
            )));
        }

        Ok(Self {
            bucket: Mutex::new(Bucket::new(capacity, refill_rate, Instant::now())),
            slow_wait: DEFAULT_SLOW_WAIT,
            warn_interval: DEFAULT_WARN_INTERVAL,
            last_warned: Mutex::new(None),
        })
    }

    /// Create a limiter from configuration
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, EngineError> {
        Ok(Self::new(config.capacity, config.refill_rate)?.with_diagnostics(config.slow_wait(), config.warn_interval()))
    }

    /// Override when and how often slow waits are reported
    pub fn with_diagnostics(mut self, slow_wait: Duration, warn_interval: Duration) -> Self {
        self.slow_wait = slow_wait;
        self.warn_interval = warn_interval;
        self
    }

    pub fn capacity(&self) -> f64 {
        self.bucket.lock().capacity()
    }

    pub fn refill_rate(&self) -> f64 {
        self.bucket.lock().refill_rate()
    }

    /// Tokens currently available
    pub fn available(&self) -> f64 {
        self.bucket.lock().available(Instant::now())
    }

    /// Take `cost` tokens without waiting
    pub fn try_acquire(&self, cost: u32) -> Result<(), EngineError> {
        let cost = self.effective_cost(cost);
        match self.bucket.lock().reserve(cost, Instant::now()) {
            Ok(()) => Ok(()),
            Err(retry_after) => {
                debug!(cost, ?retry_after, "RateLimiter::try_acquire: rejected");
                Err(EngineError::RateLimited { retry_after })
            }
        }
    }

    /// Take `cost` tokens, blocking the calling thread until they are available
    ///
    /// Returns the total time spent waiting.
    pub fn acquire_blocking(&self, cost: u32) -> Duration {
        let cost = self.effective_cost(cost);
        let mut waited = Duration::ZERO;
        loop {
            let reserved = self.bucket.lock().reserve(cost, Instant::now());
            match reserved {
                Ok(()) => {
                    self.note_wait(waited);
                    return waited;
                }
                Err(wait) => {
                    debug!(cost, ?wait, "RateLimiter::acquire_blocking: waiting for tokens");
                    std::thread::sleep(wait);
                    waited = waited.saturating_add(wait);
                }
            }
        }
    }

    /// Take `cost` tokens, suspending the calling task until they are available
    ///
    /// Other tasks on the same scheduler keep running while this one waits.
    pub async fn acquire(&self, cost: u32) -> Duration {
        let cost = self.effective_cost(cost);
        let mut waited = Duration::ZERO;
        loop {
            // The guard must be released before suspending
            let reserved = self.bucket.lock().reserve(cost, Instant::now());
            match reserved {
                Ok(()) => {
                    self.note_wait(waited);
                    return waited;
                }
                Err(wait) => {
                    debug!(cost, ?wait, "RateLimiter::acquire: waiting for tokens");
                    tokio::time::sleep(wait).await;
                    waited = waited.saturating_add(wait);
                }
            }
        }
    }

    fn effective_cost(&self, cost: u32) -> f64 {
        let capacity = self.capacity();
        let cost = f64::from(cost);
        if cost > capacity {
            warn!(cost, capacity, "Acquire cost exceeds bucket capacity, clamping");
            return capacity;
        }
        cost
    }

    /// Report a slow wait, at most once per warn interval; returns whether it reported
    fn note_wait(&self, waited: Duration) -> bool {
        if waited <= self.slow_wait {
            return false;
        }

        let now = Instant::now();
        let mut last = self.last_warned.lock();
        let quiet = last.map(|t| now.duration_since(t) >= self.warn_interval).unwrap_or(true);
        if quiet {
            *last = Some(now);
            warn!(waited_ms = waited.as_millis() as u64, "Rate limiter throttled outbound work");
        }
        quiet
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bucket = self.bucket.lock();
        f.debug_struct("RateLimiter")
            .field("capacity", &bucket.capacity())
            .field("refill_rate", &bucket.refill_rate())
            .field("slow_wait", &self.slow_wait)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(RateLimiter::new(0.0, 1.0).is_err());
        assert!(RateLimiter::new(5.0, 0.0).is_err());
        assert!(RateLimiter::new(5.0, -1.0).is_err());
        assert!(RateLimiter::new(f64::NAN, 1.0).is_err());
        assert!(RateLimiter::new(1.0, 1e-20).is_err());
        assert!(RateLimiter::new(1.0, MIN_REFILL_RATE).is_ok());
    }

    #[test]
    fn test_slowest_rate_reports_finite_wait() {
        let limiter = RateLimiter::new(1.0, MIN_REFILL_RATE).unwrap();
        limiter.try_acquire(1).unwrap();

        let err = limiter.try_acquire(1).unwrap_err();
        let retry_after = err.retry_after().unwrap();
        assert!(retry_after > Duration::from_secs(900));
        assert!(retry_after <= Duration::from_secs(1000));
    }

    #[test]
    fn test_burst_is_free() {
        let limiter = RateLimiter::new(5.0, 1.0).unwrap();
        let start = Instant::now();
        for _ in 0..5 {
            assert_eq!(limiter.acquire_blocking(1), Duration::ZERO);
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_try_acquire_fails_fast_when_empty() {
        let limiter = RateLimiter::new(2.0, 1.0).unwrap();
        limiter.try_acquire(1).unwrap();
        limiter.try_acquire(1).unwrap();

        let err = limiter.try_acquire(1).unwrap_err();
        assert!(err.is_rate_limit());
        assert!(err.retry_after().unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_blocking_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(2.0, 20.0).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire_blocking(1);
        }
        // Two tokens beyond the burst at 20/s need at least 100ms
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[test]
    fn test_oversized_cost_is_clamped() {
        let limiter = RateLimiter::new(3.0, 100.0).unwrap();
        let start = Instant::now();
        limiter.acquire_blocking(10);
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(limiter.available() < 1.0);
    }

    #[test]
    fn test_blocking_acquire_shared_across_threads() {
        let limiter = Arc::new(RateLimiter::new(4.0, 40.0).unwrap());
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..2 {
                        limiter.acquire_blocking(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // 8 permits, 4 from the burst, 4 more at 40/s
        assert!(start.elapsed() >= Duration::from_millis(95));
        assert!(limiter.available() <= limiter.capacity());
    }

    #[tokio::test]
    async fn test_async_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(3.0, 50.0).unwrap();
        let start = Instant::now();
        for _ in 0..8 {
            limiter.acquire(1).await;
        }
        // capacity + 5 acquisitions take at least 5 / rate seconds
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[tokio::test]
    async fn test_async_acquire_does_not_block_other_tasks() {
        let limiter = Arc::new(RateLimiter::new(1.0, 5.0).unwrap());
        limiter.acquire(1).await;

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(1).await })
        };

        // This runs while the waiter is suspended
        let ticked = tokio::time::timeout(Duration::from_millis(50), async { 42 }).await;
        assert_eq!(ticked.unwrap(), 42);

        let waited = waiter.await.unwrap();
        assert!(waited > Duration::ZERO);
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitConfig {
            capacity: 7.0,
            refill_rate: 3.0,
            ..Default::default()
        };
        let limiter = RateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.capacity(), 7.0);
        assert_eq!(limiter.refill_rate(), 3.0);
    }

    #[test]
    fn test_slow_wait_reported_once_per_interval() {
        let limiter = RateLimiter::new(1.0, 1.0)
            .unwrap()
            .with_diagnostics(Duration::from_millis(10), Duration::from_secs(60));

        assert!(!limiter.note_wait(Duration::from_millis(5)), "fast waits are not reported");
        assert!(limiter.note_wait(Duration::from_millis(20)));
        assert!(!limiter.note_wait(Duration::from_millis(20)), "second report inside the window");
        assert!(!limiter.note_wait(Duration::from_secs(3)));
    }

    #[test]
    fn test_slow_wait_reported_again_after_interval() {
        let limiter = RateLimiter::new(1.0, 1.0)
            .unwrap()
            .with_diagnostics(Duration::from_millis(10), Duration::from_millis(50));

        assert!(limiter.note_wait(Duration::from_millis(20)));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.note_wait(Duration::from_millis(20)));
    }

    #[test]
    fn test_blocking_acquire_reports_slow_wait() {
        let limiter = RateLimiter::new(1.0, 20.0)
            .unwrap()
            .with_diagnostics(Duration::from_millis(10), Duration::from_secs(60));
        limiter.acquire_blocking(1);
        assert!(limiter.last_warned.lock().is_none());

        // Empty bucket at 20/s waits about 50ms
        limiter.acquire_blocking(1);
        assert!(limiter.last_warned.lock().is_some());
    }
}
