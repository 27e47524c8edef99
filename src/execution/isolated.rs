//! Providers executed inside the worker realm
//!
//! [`ProviderWorkerHandler`] runs on the realm side and serves
//! `provider_call` frames from a registry of providers. [`IsolatedProvider`]
//! is the orchestrator-side stand-in: it implements [`Provider`] by
//! dispatching every call across the boundary, so the coordinator uses it
//! like any other tier. The caller's cancellation token and deadline travel
//! with each dispatch. Availability checks stay on this side of the
//! boundary and go straight to the wrapped provider.

use super::dispatcher::WorkerDispatcher;
use super::realm::WorkerHandler;
use crate::constants::worker_task_types::PROVIDER_CALL;
use crate::error::{AiError, AiResult};
use crate::orchestration::provider::{CallContext, Provider, ProviderTier};
use crate::types::{TaskInput, TaskKind, TaskOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProviderCall {
    provider_id: String,
    input: TaskInput,
}

/// Realm-side handler serving provider calls
#[derive(Default)]
pub struct ProviderWorkerHandler {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderWorkerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderWorkerHandler")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderWorkerHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl WorkerHandler for ProviderWorkerHandler {
    async fn handle(&self, task_type: &str, data: serde_json::Value) -> AiResult<serde_json::Value> {
        if task_type != PROVIDER_CALL {
            return Err(AiError::processing_failed(format!(
                "worker realm rejected unknown task type '{task_type}'"
            )));
        }

        let call: ProviderCall = serde_json::from_value(data)
            .map_err(|e| AiError::invalid_input(format!("malformed provider call: {e}")))?;
        let provider = self.providers.get(&call.provider_id).ok_or_else(|| {
            AiError::processing_failed(format!(
                "worker realm has no provider '{}'",
                call.provider_id
            ))
        })?;

        let output = provider.call(&call.input).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Orchestrator-side proxy for a provider hosted in the worker realm
pub struct IsolatedProvider {
    inner: Arc<dyn Provider>,
    dispatcher: WorkerDispatcher,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for IsolatedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedProvider")
            .field("id", &self.inner.id())
            .field("tier", &self.inner.tier())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl IsolatedProvider {
    /// Proxy `provider`; calls go through `dispatcher`, which must be served
    /// by a realm that has the same provider registered
    pub fn new(provider: Arc<dyn Provider>, dispatcher: WorkerDispatcher) -> Self {
        Self {
            inner: provider,
            dispatcher,
            timeout: None,
        }
    }

    /// Upper bound for every dispatched call, tightened by caller deadlines
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn dispatch_timeout(&self, context: &CallContext) -> Option<Duration> {
        match (self.timeout, context.remaining()) {
            (Some(own), Some(remaining)) => Some(own.min(remaining)),
            (own, remaining) => own.or(remaining),
        }
    }
}

#[async_trait]
impl Provider for IsolatedProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn tier(&self) -> ProviderTier {
        self.inner.tier()
    }

    fn supports(&self, kind: TaskKind) -> bool {
        self.inner.supports(kind)
    }

    async fn check_availability(&self) -> bool {
        !self.dispatcher.is_shut_down() && self.inner.check_availability().await
    }

    async fn call(&self, input: &TaskInput) -> AiResult<TaskOutput> {
        self.call_with_context(input, &CallContext::default()).await
    }

    async fn call_with_context(
        &self,
        input: &TaskInput,
        context: &CallContext,
    ) -> AiResult<TaskOutput> {
        let call = ProviderCall {
            provider_id: self.inner.id().to_string(),
            input: input.clone(),
        };
        self.dispatcher
            .dispatch_typed(
                PROVIDER_CALL,
                &call,
                self.dispatch_timeout(context),
                context.cancellation.as_ref(),
            )
            .await
    }
}
