//! # Retry Executor
//!
//! Runs an async operation with bounded attempts and exponential backoff.
//!
//! Failures are classified before they reach this module; the executor only
//! reads [`AiError::is_retryable`]. A non-retryable error aborts immediately,
//! a retryable one sleeps `min(base * 2^(attempt-1) ± jitter, max)` and tries
//! again until the attempt budget is spent.

use crate::config::RetryConfig;
use crate::error::{AiError, AiResult};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Largest exponent applied to the base delay; later attempts are capped anyway
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Backoff parameters for one executor
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_min: defaults.jitter_min,
            jitter_max: defaults.jitter_max,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter_min: config.jitter_min,
            jitter_max: config.jitter_max,
        }
    }

    /// Policy that never sleeps and never jitters
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_min: 0.0,
            jitter_max: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_min: f64, jitter_max: f64) -> Self {
        let lo = jitter_min.clamp(0.0, 1.0);
        let hi = jitter_max.clamp(0.0, 1.0);
        self.jitter_min = lo.min(hi);
        self.jitter_max = lo.max(hi);
        self
    }

    /// Un-jittered delay after the given failed attempt (1-based)
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Delay to sleep after the given failed attempt, jittered and capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let computed_ms = self.base_delay.as_millis() as f64 * f64::from(1u32 << exponent);

        let mut rng = rand::thread_rng();
        let fraction = if self.jitter_max > 0.0 {
            rng.gen_range(self.jitter_min..=self.jitter_max)
        } else {
            0.0
        };
        let jitter_ms = computed_ms * fraction;
        let jittered_ms = if rng.gen_bool(0.5) {
            computed_ms + jitter_ms
        } else {
            (computed_ms - jitter_ms).max(0.0)
        };

        Duration::from_millis(jittered_ms.round() as u64).min(self.max_delay)
    }
}

/// Observation emitted right before the executor sleeps
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: AiError,
}

type RetryCallback = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Executes operations under a [`RetryPolicy`]. Holds no mutable state, so one
/// executor can be shared by any number of concurrent callers.
#[derive(Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    on_retry: Option<RetryCallback>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("has_callback", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }

    /// Invoke `callback` before every backoff sleep
    pub fn with_retry_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Same executor and callback with a different attempt budget
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        let mut executor = self.clone();
        executor.policy.max_attempts = max_attempts.max(1);
        executor
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt
    /// budget is exhausted. The closure receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> AiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AiResult<T>>,
    {
        self.execute_with_cancellation(operation, None).await
    }

    /// Like [`execute`](Self::execute), but stops before the next attempt
    /// (or during a backoff sleep) once `cancellation` fires. An attempt that
    /// is already running is not interrupted.
    pub async fn execute_with_cancellation<T, F, Fut>(
        &self,
        mut operation: F,
        cancellation: Option<&CancellationToken>,
    ) -> AiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AiResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if cancellation.is_some_and(CancellationToken::is_cancelled) {
                return Err(AiError::cancelled("retry loop stopped before next attempt")
                    .with_attempts(attempt - 1));
            }

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt = attempt, "✅ Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(
                    attempt = attempt,
                    kind = %error.kind(),
                    "Non-retryable failure, aborting retries"
                );
                return Err(error.with_attempts(attempt));
            }

            if attempt >= max_attempts {
                warn!(
                    attempts = attempt,
                    kind = %error.kind(),
                    error = %error.message(),
                    "🔴 Retry budget exhausted"
                );
                return Err(error.with_attempts(attempt));
            }

            let delay = self.policy.delay_for_attempt(attempt);
            debug!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind = %error.kind(),
                "🔁 Retryable failure, backing off"
            );

            if let Some(callback) = &self.on_retry {
                callback(&RetryEvent {
                    attempt,
                    max_attempts,
                    delay,
                    error: error.clone(),
                });
            }

            match cancellation {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(AiError::cancelled(format!(
                                "retry backoff interrupted after attempt {attempt}: {}",
                                error.message()
                            ))
                            .with_attempts(attempt));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

/// Convenience wrapper: run `operation` with the given attempt budget and
/// backoff bounds using the default jitter band
pub async fn execute_with_retry<T, F, Fut>(
    operation: F,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
) -> AiResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AiResult<T>>,
{
    RetryExecutor::new(RetryPolicy::new(max_attempts, base_delay, max_delay))
        .execute(operation)
        .await
}
