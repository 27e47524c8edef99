//! Provider collaborator contract
//!
//! A provider is one external service implementing some subset of the task
//! kinds. The coordinator does not care whether it runs on-device or
//! remotely; the tier is carried for logging and ordering only.

use crate::error::AiResult;
use crate::types::{TaskInput, TaskKind, TaskOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where a provider runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    /// On-device, no per-call cost
    Local,
    /// Network service, possibly metered
    Remote,
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderTier::Local => write!(f, "local"),
            ProviderTier::Remote => write!(f, "remote"),
        }
    }
}

/// Caller state carried into a single provider call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub cancellation: Option<CancellationToken>,
    /// Point at which the caller stops waiting for the request
    pub deadline: Option<Instant>,
}

impl CallContext {
    /// Time left before the deadline; `None` when the caller set none
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Uniform call contract for every AI capability
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in logs, status records and compound errors
    fn id(&self) -> &str;

    fn tier(&self) -> ProviderTier;

    /// Static capability check; unsupported kinds are skipped without a call
    fn supports(&self, kind: TaskKind) -> bool;

    /// Cheap availability check. Must not run a full task.
    async fn check_availability(&self) -> bool;

    /// Execute one task. Failures must already be classified.
    async fn call(&self, input: &TaskInput) -> AiResult<TaskOutput>;

    /// Execute one task with the caller's cancellation signal and deadline.
    /// Providers that can stop in-flight work early override this.
    async fn call_with_context(
        &self,
        input: &TaskInput,
        _context: &CallContext,
    ) -> AiResult<TaskOutput> {
        self.call(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down_to_zero() {
        let context = CallContext {
            cancellation: None,
            deadline: Some(Instant::now() + Duration::from_millis(100)),
        };
        assert_eq!(context.remaining(), Some(Duration::from_millis(100)));

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(context.remaining(), Some(Duration::ZERO));
        assert_eq!(CallContext::default().remaining(), None);
    }

    #[test]
    fn test_cancellation_is_observed() {
        let token = CancellationToken::new();
        let context = CallContext {
            cancellation: Some(token.clone()),
            deadline: None,
        };
        assert!(!context.is_cancelled());
        token.cancel();
        assert!(context.is_cancelled());
    }
}
