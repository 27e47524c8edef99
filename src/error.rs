//! # Error Types
//!
//! Classified failures produced at the provider boundary and propagated
//! unchanged through retry, fallback and batch execution.
//!
//! Every [`AiError`] carries a definitive `retryable` flag that is independent
//! of its [`AiErrorKind`]. Retry and fallback logic consults only that flag;
//! the kind exists for reporting and for the caller's choice of message.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure taxonomy shared by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiErrorKind {
    Network,
    ServiceUnavailable,
    RateLimited,
    /// Never retried
    InvalidInput,
    ProcessingFailed,
}

impl AiErrorKind {
    /// Retryable flag assigned when a constructor does not override it
    pub fn default_retryable(self) -> bool {
        match self {
            AiErrorKind::Network | AiErrorKind::ServiceUnavailable | AiErrorKind::RateLimited => {
                true
            }
            AiErrorKind::InvalidInput | AiErrorKind::ProcessingFailed => false,
        }
    }
}

impl fmt::Display for AiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiErrorKind::Network => write!(f, "Network"),
            AiErrorKind::ServiceUnavailable => write!(f, "Service Unavailable"),
            AiErrorKind::RateLimited => write!(f, "Rate Limited"),
            AiErrorKind::InvalidInput => write!(f, "Invalid Input"),
            AiErrorKind::ProcessingFailed => write!(f, "Processing Failed"),
        }
    }
}

/// One provider's contribution to a compound failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub kind: AiErrorKind,
    pub message: String,
    pub retryable: bool,
}

/// Classified failure
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct AiError {
    kind: AiErrorKind,
    message: String,
    retryable: bool,
    attempts: Option<u32>,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    provider_failures: Vec<ProviderFailure>,
}

impl AiError {
    pub fn new(kind: AiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
            attempts: None,
            cause: None,
            provider_failures: Vec::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AiErrorKind::Network, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(AiErrorKind::ServiceUnavailable, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(AiErrorKind::RateLimited, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(AiErrorKind::InvalidInput, message)
    }

    pub fn processing_failed(message: impl Into<String>) -> Self {
        Self::new(AiErrorKind::ProcessingFailed, message)
    }

    /// Worker task exceeded its local deadline
    pub fn timeout(task_type: &str, timeout_ms: u64) -> Self {
        Self::processing_failed(format!(
            "worker task '{task_type}' timed out after {timeout_ms}ms"
        ))
    }

    /// Work abandoned because of a cancellation signal or teardown
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::processing_failed(format!("cancelled: {}", message.into()))
    }

    /// Compound error raised once every provider in the fallback chain failed.
    ///
    /// The result is retryable only if every provider failure was retryable.
    pub fn all_providers_failed(failures: Vec<ProviderFailure>) -> Self {
        let retryable = !failures.is_empty() && failures.iter().all(|f| f.retryable);
        let summary = if failures.is_empty() {
            "no provider available".to_string()
        } else {
            failures
                .iter()
                .map(|f| format!("{} [{}]: {}", f.provider_id, f.kind, f.message))
                .collect::<Vec<_>>()
                .join("; ")
        };

        let kind = match failures.as_slice() {
            [] => AiErrorKind::ServiceUnavailable,
            [first, rest @ ..] if rest.iter().all(|f| f.kind == first.kind) => first.kind,
            _ => AiErrorKind::ServiceUnavailable,
        };

        Self {
            kind,
            message: format!("all providers failed: {summary}"),
            retryable,
            attempts: None,
            cause: None,
            provider_failures: failures,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn kind(&self) -> AiErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Number of attempts spent before this error was surfaced, if known
    pub fn attempts(&self) -> Option<u32> {
        self.attempts
    }

    pub fn provider_failures(&self) -> &[ProviderFailure] {
        &self.provider_failures
    }

    pub fn is_compound(&self) -> bool {
        !self.provider_failures.is_empty()
    }

    /// Record this error as one provider's failure
    pub fn to_provider_failure(&self, provider_id: &str) -> ProviderFailure {
        ProviderFailure {
            provider_id: provider_id.to_string(),
            kind: self.kind,
            message: self.message.clone(),
            retryable: self.retryable,
        }
    }

    /// Serializable summary for the outermost caller
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind,
            message: self.message.clone(),
            retryable: self.retryable,
            attempts: self.attempts,
            providers: self.provider_failures.clone(),
        }
    }
}

impl PartialEq for AiError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.message == other.message
            && self.retryable == other.retryable
            && self.attempts == other.attempts
            && self.provider_failures == other.provider_failures
    }
}

impl From<serde_json::Error> for AiError {
    fn from(error: serde_json::Error) -> Self {
        AiError::processing_failed(format!("JSON serialization error: {error}")).with_cause(error)
    }
}

/// Caller-facing error summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: AiErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub providers: Vec<ProviderFailure>,
}

impl From<ErrorReport> for AiError {
    /// Rebuild a classified error received across a message boundary
    fn from(report: ErrorReport) -> Self {
        let mut error = AiError::new(report.kind, report.message).with_retryable(report.retryable);
        error.attempts = report.attempts;
        error.provider_failures = report.providers;
        error
    }
}

pub type AiResult<T> = std::result::Result<T, AiError>;
