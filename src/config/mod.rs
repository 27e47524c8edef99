//! # Orchestrator Configuration
//!
//! YAML-backed configuration for retry, caching, provider probing, batching
//! and the worker dispatcher. Every section has production defaults so an
//! orchestrator can be built without a configuration file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use textflow_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retry = &manager.config().retry;
//! println!("max attempts: {}", retry.max_attempts);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::cache::hashing::{DEFAULT_FULL_SCAN_THRESHOLD, DEFAULT_SAMPLE_POINTS};
use crate::constants::{
    batch, cache, providers, retry, DEFAULT_WORKER_TIMEOUT_MS, MAX_CONCURRENT_TASKS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring textflow-config.yaml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Retry and backoff settings applied to every provider call
    pub retry: RetryConfig,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Provider availability probing
    pub providers: ProvidersConfig,

    /// Batch partitioning and concurrency
    pub batch: BatchConfig,

    /// Isolated worker realm settings
    pub worker: WorkerConfig,
}

/// Backoff and retry configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Lower bound of the jitter fraction applied to each delay
    pub jitter_min: f64,
    /// Upper bound of the jitter fraction applied to each delay
    pub jitter_max: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: retry::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: retry::DEFAULT_MAX_DELAY_MS,
            jitter_min: retry::DEFAULT_JITTER_MIN,
            jitter_max: retry::DEFAULT_JITTER_MAX,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Caching configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    /// Byte budget of the in-memory tier
    pub max_bytes: usize,
    /// Inputs shorter than this many bytes are hashed in full
    pub full_scan_threshold: usize,
    /// Evenly spaced characters sampled from larger inputs
    pub sample_points: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: cache::DEFAULT_TTL_SECONDS,
            max_bytes: cache::DEFAULT_MAX_BYTES,
            full_scan_threshold: DEFAULT_FULL_SCAN_THRESHOLD,
            sample_points: DEFAULT_SAMPLE_POINTS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Provider availability configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Maximum age of a cached availability check
    pub status_ttl_seconds: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            status_ttl_seconds: providers::DEFAULT_STATUS_TTL_SECONDS,
        }
    }
}

impl ProvidersConfig {
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_seconds)
    }
}

/// Batch execution configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub concurrency_limit: usize,
    /// Target size in characters of one document chunk
    pub chunk_target_chars: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: batch::DEFAULT_BATCH_SIZE,
            concurrency_limit: batch::DEFAULT_CONCURRENCY_LIMIT,
            chunk_target_chars: batch::DEFAULT_CHUNK_TARGET_CHARS,
        }
    }
}

/// Worker dispatcher configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_concurrent_tasks: usize,
    pub default_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: MAX_CONCURRENT_TASKS,
            default_timeout_ms: DEFAULT_WORKER_TIMEOUT_MS,
        }
    }
}

impl WorkerConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl OrchestratorConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                "0",
                "at least one attempt is required",
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.retry.base_delay_ms.to_string(),
                format!(
                    "base delay must not exceed max_delay_ms ({})",
                    self.retry.max_delay_ms
                ),
            ));
        }

        let jitter_range = 0.0..=1.0;
        if !jitter_range.contains(&self.retry.jitter_min)
            || !jitter_range.contains(&self.retry.jitter_max)
            || self.retry.jitter_min > self.retry.jitter_max
        {
            return Err(ConfigurationError::invalid_value(
                "retry.jitter_min/jitter_max",
                format!("{}/{}", self.retry.jitter_min, self.retry.jitter_max),
                "jitter bounds must satisfy 0 <= min <= max <= 1",
            ));
        }

        if self.cache.sample_points == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.sample_points",
                "0",
                "sampling needs at least one point",
            ));
        }

        if self.batch.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.batch.concurrency_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.concurrency_limit",
                "0",
                "concurrency limit must be greater than 0",
            ));
        }

        if self.batch.chunk_target_chars == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.chunk_target_chars",
                "0",
                "chunk target must be greater than 0",
            ));
        }

        if self.worker.max_concurrent_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.max_concurrent_tasks",
                "0",
                "worker realm must host at least one task",
            ));
        }

        Ok(())
    }
}
