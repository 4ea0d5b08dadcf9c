//! Zoro configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::Mode;
use crate::error::EngineError;
use crate::ratelimit::MIN_REFILL_RATE;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task engine settings
    pub engine: EngineConfig,

    /// Outbound rate limiting
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Check values the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        self.engine.validate()?;
        self.rate_limit.validate()
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config, then user config
        for candidate in Self::search_paths(None) {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Config files in lookup order: explicit path, else ./.zoro.yml then ~/.config/zoro/zoro.yml
    fn search_paths(config_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = config_path {
            return vec![path.clone()];
        }
        let mut paths = vec![PathBuf::from(".zoro.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("zoro").join("zoro.yml"));
        }
        paths
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Follows the same lookup as [`Config::load`]: the first file that parses wins.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::log_level_from(&Self::search_paths(config_path))
    }

    fn log_level_from(paths: &[PathBuf]) -> Option<String> {
        paths
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| {
                let content = fs::read_to_string(path).ok()?;
                serde_yaml::from_str::<Self>(&content)
                    .ok()
                    .filter(|config| config.validate().is_ok())
            })?
            .log_level
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Task engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker thread count in pooled mode; semaphore size for bounded cooperative runs
    pub workers: usize,

    /// Default per-attempt timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Default number of re-attempts after a failed execution
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Default execution strategy
    pub mode: Mode,

    /// Base delay before a retry; 0 retries immediately
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on the retry delay
    #[serde(rename = "retry-backoff-cap-ms")]
    pub retry_backoff_cap_ms: u64,

    /// Limit cooperative runs to `workers` in-flight units
    #[serde(rename = "bound-cooperative")]
    pub bound_cooperative: bool,

    /// How long an idle pooled worker waits for work before rechecking the stop flag
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Time allowed for in-flight work when the engine shuts down
    #[serde(rename = "shutdown-grace-ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            timeout_ms: 30_000,
            max_retries: 0,
            mode: Mode::Pooled,
            retry_backoff_ms: 0,
            retry_backoff_cap_ms: 5_000,
            bound_cooperative: false,
            poll_interval_ms: 50,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Delay before retry number `retry` (1-based), if backoff is enabled
    pub fn retry_delay(&self, retry: u32) -> Option<Duration> {
        if self.retry_backoff_ms == 0 || retry == 0 {
            return None;
        }
        let factor = 2u64.saturating_pow(retry - 1);
        let delay = self.retry_backoff_ms.saturating_mul(factor).min(self.retry_backoff_cap_ms);
        Some(Duration::from_millis(delay))
    }

    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig("engine.workers must be at least 1".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(EngineError::InvalidConfig("engine.timeout-ms must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "engine.poll-interval-ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token bucket settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum burst size
    pub capacity: f64,

    /// Tokens added per second
    #[serde(rename = "refill-rate")]
    pub refill_rate: f64,

    /// Waits longer than this are logged
    #[serde(rename = "slow-wait-ms")]
    pub slow_wait_ms: u64,

    /// Minimum spacing between slow-wait log events
    #[serde(rename = "warn-interval-ms")]
    pub warn_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill_rate: 10.0,
            slow_wait_ms: 1_000,
            warn_interval_ms: 5_000,
        }
    }
}

impl RateLimitConfig {
    pub fn slow_wait(&self) -> Duration {
        Duration::from_millis(self.slow_wait_ms)
    }

    pub fn warn_interval(&self) -> Duration {
        Duration::from_millis(self.warn_interval_ms)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.capacity.is_nan() || self.capacity < 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "rate-limit.capacity must be at least 1, got {}",
                self.capacity
            )));
        }
        if self.refill_rate.is_nan() || self.refill_rate < MIN_REFILL_RATE {
            return Err(EngineError::InvalidConfig(format!(
                "rate-limit.refill-rate must be at least {}, got {}",
                MIN_REFILL_RATE, self.refill_rate
            )));
        }
        Ok(())
    }
}
