//! # Service Coordinator
//!
//! Executes one task against an ordered fallback chain of providers.
//!
//! ## Request lifecycle
//!
//! ```text
//! Pending ──▶ Trying(0) ──ok──▶ Success(0)
//!                │
//!                └─fail──▶ Trying(1) ──ok──▶ Success(1)
//!                             │
//!                             └─fail──▶ ... ──▶ AllFailed
//! ```
//!
//! Each provider is called through the [`RetryExecutor`]. A provider that
//! does not support the task kind, or whose cached status says it is down,
//! is skipped without a call. A non-retryable failure disables that provider
//! for the rest of the [`RequestCycle`]. When every provider has failed the
//! per-provider errors are folded into one compound [`AiError`] that is
//! retryable only if all of its parts were.
//!
//! Results are looked up in and written to the [`ResultCache`] when one is
//! configured. Cache problems never fail a request.

use super::provider::{CallContext, Provider};
use super::provider_status::ProviderStatusRegistry;
use crate::cache::ResultCache;
use crate::error::{AiError, AiErrorKind, AiResult, ProviderFailure};
use crate::logging::log_provider_operation;
use crate::resilience::RetryExecutor;
use crate::types::{TaskInput, TaskOutput};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-request position in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Pending,
    /// Calling the provider at this index
    Trying(usize),
    /// The provider at this index produced the result
    Success(usize),
    AllFailed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Pending => write!(f, "PENDING"),
            RequestState::Trying(i) => write!(f, "TRYING[{i}]"),
            RequestState::Success(i) => write!(f, "SUCCESS[{i}]"),
            RequestState::AllFailed => write!(f, "ALL_FAILED"),
        }
    }
}

/// Successful coordinator result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub output: TaskOutput,
    /// Provider that produced the output, or `"cache"`
    pub provider_id: String,
    /// Calls made to the producing provider; 0 for a cache hit
    pub attempts: u32,
    pub from_cache: bool,
}

/// Providers disabled by non-retryable failures. Shared by every request
/// belonging to the same logical operation, e.g. the chunks of one document.
#[derive(Debug, Default)]
pub struct RequestCycle {
    disabled: Mutex<HashSet<String>>,
}

impl RequestCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable(&self, provider_id: &str) {
        self.disabled.lock().insert(provider_id.to_string());
    }

    pub fn is_disabled(&self, provider_id: &str) -> bool {
        self.disabled.lock().contains(provider_id)
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Attempt budget per provider; the executor's policy when `None`
    pub max_attempts: Option<u32>,
    /// Reaches every provider call, including work dispatched to the worker
    /// realm
    pub cancellation: Option<CancellationToken>,
    /// Budget for the whole request, handed to providers as a deadline
    pub timeout: Option<Duration>,
    /// Skip the cache for both lookup and store
    pub bypass_cache: bool,
}

/// Ordered fallback chain over providers
pub struct ServiceCoordinator {
    providers: Vec<Arc<dyn Provider>>,
    retry: RetryExecutor,
    cache: Option<Arc<ResultCache>>,
    status: Arc<ProviderStatusRegistry>,
}

impl fmt::Debug for ServiceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCoordinator")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field("retry", &self.retry)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl ServiceCoordinator {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        retry: RetryExecutor,
        status: Arc<ProviderStatusRegistry>,
    ) -> Self {
        Self {
            providers,
            retry,
            cache: None,
            status,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn status_registry(&self) -> &Arc<ProviderStatusRegistry> {
        &self.status
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    pub fn retry_executor(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Execute `input` with default options in a fresh request cycle
    pub async fn execute(&self, input: &TaskInput) -> AiResult<ProviderResponse> {
        self.execute_with(input, &CallOptions::default(), &RequestCycle::new())
            .await
    }

    /// Execute `input` through the fallback chain
    pub async fn execute_with(
        &self,
        input: &TaskInput,
        options: &CallOptions,
        cycle: &RequestCycle,
    ) -> AiResult<ProviderResponse> {
        let kind = input.kind();
        let cache = self.cache.as_ref().filter(|_| !options.bypass_cache);
        let cache_key = cache.map(|cache| cache.key_for(input));

        if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
            if let Some(output) = cache.get::<TaskOutput>(key).await {
                if output.kind() == kind {
                    debug!(task_kind = %kind, "Serving result from cache");
                    return Ok(ProviderResponse {
                        output,
                        provider_id: "cache".to_string(),
                        attempts: 0,
                        from_cache: true,
                    });
                }
                cache.remove(key).await;
            }
        }

        let retry = match options.max_attempts {
            Some(max_attempts) => self.retry.with_max_attempts(max_attempts),
            None => self.retry.clone(),
        };
        let cancellation = options.cancellation.as_ref();
        let context = CallContext {
            cancellation: options.cancellation.clone(),
            deadline: options.timeout.map(|timeout| Instant::now() + timeout),
        };

        let mut state = RequestState::Pending;
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut total_attempts = 0u32;

        for (index, provider) in self.providers.iter().enumerate() {
            let provider_id = provider.id();

            if !provider.supports(kind) {
                debug!(provider_id = %provider_id, task_kind = %kind, "Provider does not support task kind, skipping");
                continue;
            }
            if cycle.is_disabled(provider_id) {
                debug!(provider_id = %provider_id, "Provider disabled for this request cycle, skipping");
                continue;
            }
            if !self.status.is_available(provider.as_ref()).await {
                debug!(provider_id = %provider_id, "Provider reported unavailable, skipping");
                failures.push(ProviderFailure {
                    provider_id: provider_id.to_string(),
                    kind: AiErrorKind::ServiceUnavailable,
                    message: "provider unavailable".to_string(),
                    retryable: true,
                });
                continue;
            }
            if cancellation.is_some_and(CancellationToken::is_cancelled) {
                return Err(AiError::cancelled("request cancelled before provider call")
                    .with_attempts(total_attempts));
            }

            state = transition(state, RequestState::Trying(index), provider_id);

            let mut last_attempt = 0u32;
            let outcome = retry
                .execute_with_cancellation(
                    |attempt| {
                        last_attempt = attempt;
                        call_checked(provider.as_ref(), input, &context)
                    },
                    cancellation,
                )
                .await;
            total_attempts += last_attempt;

            match outcome {
                Ok(output) => {
                    transition(state, RequestState::Success(index), provider_id);
                    log_provider_operation(
                        "call",
                        provider_id,
                        kind.as_str(),
                        "success",
                        Some(last_attempt),
                        None,
                    );

                    if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
                        cache.set(key, &output).await;
                    }

                    return Ok(ProviderResponse {
                        output,
                        provider_id: provider_id.to_string(),
                        attempts: last_attempt,
                        from_cache: false,
                    });
                }
                Err(error) => {
                    if cancellation.is_some_and(CancellationToken::is_cancelled) {
                        return Err(error);
                    }

                    log_provider_operation(
                        "call",
                        provider_id,
                        kind.as_str(),
                        "failed",
                        Some(last_attempt),
                        Some(error.message()),
                    );

                    if !error.is_retryable() {
                        cycle.disable(provider_id);
                    }
                    if error.kind() == AiErrorKind::ServiceUnavailable {
                        self.status.mark_unavailable(provider_id).await;
                    }
                    failures.push(error.to_provider_failure(provider_id));
                }
            }
        }

        transition(state, RequestState::AllFailed, "-");
        let error = AiError::all_providers_failed(failures).with_attempts(total_attempts);
        warn!(
            task_kind = %kind,
            retryable = error.is_retryable(),
            error = %error.message(),
            "🔴 Every provider in the fallback chain failed"
        );
        Err(error)
    }
}

fn transition(from: RequestState, to: RequestState, provider_id: &str) -> RequestState {
    info!(from = %from, to = %to, provider_id = %provider_id, "🔄 Request state transition");
    to
}

/// Call `provider` and reject outputs of the wrong kind. A cancelled caller
/// stops waiting even if the provider keeps running.
async fn call_checked(
    provider: &dyn Provider,
    input: &TaskInput,
    context: &CallContext,
) -> AiResult<TaskOutput> {
    let call = provider.call_with_context(input, context);
    let output = match &context.cancellation {
        Some(token) => tokio::select! {
            output = call => output?,
            _ = token.cancelled() => {
                return Err(AiError::cancelled(format!(
                    "call to provider '{}' cancelled by caller",
                    provider.id()
                )));
            }
        },
        None => call.await?,
    };
    if output.kind() != input.kind() {
        return Err(AiError::processing_failed(format!(
            "provider '{}' returned {} output for a {} task",
            provider.id(),
            output.kind(),
            input.kind()
        )));
    }
    Ok(output)
}
