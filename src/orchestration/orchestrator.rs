//! # Orchestrator
//!
//! Caller-facing entry point. An [`Orchestrator`] is assembled explicitly by
//! [`OrchestratorBuilder`] and owns its cache, provider status registry,
//! coordinator, batch scheduler and (optionally) worker dispatcher. Nothing
//! is global; two orchestrators never share state unless they are handed the
//! same store.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use textflow_core::orchestration::{OrchestratorBuilder, SubmitOptions};
//! use textflow_core::types::TaskInput;
//! # use textflow_core::orchestration::Provider;
//! # use std::sync::Arc;
//!
//! # async fn example(local: Arc<dyn Provider>, remote: Arc<dyn Provider>) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = OrchestratorBuilder::new()
//!     .provider(local)
//!     .provider(remote)
//!     .build()?;
//!
//! let response = orchestrator
//!     .submit_task(
//!         TaskInput::Summarization { text: "...".into(), max_sentences: Some(3) },
//!         &SubmitOptions::default(),
//!     )
//!     .await?;
//! println!("summarized by {}", response.provider_id);
//!
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

use super::batch::{BatchOptions, BatchProgress, BatchResult, BatchScheduler, ProgressCallback};
use super::chunking::{chunk_text, reassemble};
use super::coordinator::{CallOptions, ProviderResponse, RequestCycle, ServiceCoordinator};
use super::provider::Provider;
use super::provider_status::{ProviderStatus, ProviderStatusRegistry};
use crate::cache::{CacheStats, KeyValueStore, ResultCache};
use crate::config::{ConfigResult, ConfigurationError, OrchestratorConfig};
use crate::constants::DECLARED_LANGUAGE_CONFIDENCE;
use crate::error::{AiError, AiResult};
use crate::execution::{
    IsolatedProvider, ProviderWorkerHandler, RealmHost, TokioRealmHost, WorkerDispatcher,
};
use crate::resilience::{RetryEvent, RetryExecutor, RetryPolicy};
use crate::types::{ContentSource, DetectedLanguage, Task, TaskInput, TaskKind, TaskOutput};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Options accepted by every submit operation
#[derive(Clone, Default)]
pub struct SubmitOptions {
    /// Retries after the first attempt, per provider
    pub max_retries: Option<u32>,
    /// Overall deadline for the submitted work
    pub timeout_ms: Option<u64>,
    pub progress_callback: Option<ProgressCallback>,
    pub cancellation_token: Option<CancellationToken>,
}

impl fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("max_retries", &self.max_retries)
            .field("timeout_ms", &self.timeout_ms)
            .field("has_progress_callback", &self.progress_callback.is_some())
            .field("cancellable", &self.cancellation_token.is_some())
            .finish()
    }
}

impl SubmitOptions {
    fn call_options(&self) -> CallOptions {
        CallOptions {
            max_attempts: self.max_retries.map(|retries| retries.saturating_add(1)),
            cancellation: self.cancellation_token.clone(),
            timeout: self.timeout_ms.map(Duration::from_millis),
            bypass_cache: false,
        }
    }

    /// Items run through the coordinator, which already applies the retry
    /// budget per provider
    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency_limit: None,
            max_attempts: Some(1),
            progress_callback: self.progress_callback.clone(),
            cancellation: self.cancellation_token.clone(),
        }
    }
}

enum ProviderEntry {
    Direct(Arc<dyn Provider>),
    Isolated(Arc<dyn Provider>),
}

/// Assembles an [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    providers: Vec<ProviderEntry>,
    store: Option<Arc<dyn KeyValueStore>>,
    realm_host: Option<Arc<dyn RealmHost>>,
    retry_callback: Option<Arc<dyn Fn(&RetryEvent) + Send + Sync>>,
}

impl fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("providers", &self.providers.len())
            .field("store", &self.store.as_ref().map(|s| s.store_name()))
            .field("custom_realm_host", &self.realm_host.is_some())
            .finish()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a provider to the fallback chain; order is priority
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(ProviderEntry::Direct(provider));
        self
    }

    /// Append a provider that executes inside the isolated worker realm
    pub fn isolated_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(ProviderEntry::Isolated(provider));
        self
    }

    /// Persistent store backing the result cache and provider statuses
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the in-process realm host. Isolated providers must then be
    /// served by that host.
    pub fn realm_host(mut self, host: Arc<dyn RealmHost>) -> Self {
        self.realm_host = Some(host);
        self
    }

    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.retry_callback = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> ConfigResult<Orchestrator> {
        let config = self.config;
        config.validate()?;

        let cache = Arc::new(match &self.store {
            Some(store) => ResultCache::with_store(config.cache.clone(), Arc::clone(store)),
            None => ResultCache::new(config.cache.clone()),
        });
        let status = Arc::new(match &self.store {
            Some(store) => {
                ProviderStatusRegistry::with_store(config.providers.status_ttl(), Arc::clone(store))
            }
            None => ProviderStatusRegistry::new(config.providers.status_ttl()),
        });

        let mut retry = RetryExecutor::new(RetryPolicy::from_config(&config.retry));
        if let Some(callback) = self.retry_callback {
            retry = retry.with_retry_callback(move |event| callback(event));
        }

        let has_isolated = self
            .providers
            .iter()
            .any(|entry| matches!(entry, ProviderEntry::Isolated(_)));
        let dispatcher = match (self.realm_host, has_isolated) {
            (Some(host), _) => Some(WorkerDispatcher::new(host, &config.worker)),
            (None, true) => {
                let mut handler = ProviderWorkerHandler::new();
                for entry in &self.providers {
                    if let ProviderEntry::Isolated(provider) = entry {
                        handler.register(Arc::clone(provider));
                    }
                }
                let host: Arc<dyn RealmHost> = Arc::new(TokioRealmHost::new(Arc::new(handler)));
                Some(WorkerDispatcher::new(host, &config.worker))
            }
            (None, false) => None,
        };

        let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(self.providers.len());
        for entry in self.providers {
            match entry {
                ProviderEntry::Direct(provider) => providers.push(provider),
                ProviderEntry::Isolated(provider) => {
                    let dispatcher = dispatcher.clone().ok_or_else(|| {
                        ConfigurationError::invalid_value(
                            "providers",
                            provider.id(),
                            "isolated provider requires a worker dispatcher",
                        )
                    })?;
                    providers.push(Arc::new(IsolatedProvider::new(provider, dispatcher)));
                }
            }
        }

        info!(
            providers = providers.len(),
            isolated = has_isolated,
            cache_enabled = config.cache.enabled,
            "🚀 Orchestrator built"
        );

        let coordinator = ServiceCoordinator::new(providers, retry.clone(), Arc::clone(&status))
            .with_cache(Arc::clone(&cache));
        let scheduler = BatchScheduler::new(config.batch.clone(), retry);

        Ok(Orchestrator {
            config,
            coordinator,
            cache,
            status,
            scheduler,
            dispatcher,
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Caller-facing task orchestration API
pub struct Orchestrator {
    config: OrchestratorConfig,
    coordinator: ServiceCoordinator,
    cache: Arc<ResultCache>,
    status: Arc<ProviderStatusRegistry>,
    scheduler: BatchScheduler,
    dispatcher: Option<WorkerDispatcher>,
    shut_down: AtomicBool,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("coordinator", &self.coordinator)
            .field("dispatcher", &self.dispatcher)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &ServiceCoordinator {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> Option<&WorkerDispatcher> {
        self.dispatcher.as_ref()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        self.status.snapshot()
    }

    /// Re-check every provider, ignoring cached statuses
    pub async fn refresh_providers(&self) -> Vec<ProviderStatus> {
        self.status
            .refresh_all(self.coordinator.providers(), true)
            .await
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Execute one task through the fallback chain
    pub async fn submit_task(
        &self,
        input: TaskInput,
        options: &SubmitOptions,
    ) -> AiResult<ProviderResponse> {
        self.submit(&Task::new(input), options).await
    }

    /// Execute a caller-built [`Task`]; its id tags every log line of the
    /// request
    pub async fn submit(&self, task: &Task, options: &SubmitOptions) -> AiResult<ProviderResponse> {
        self.ensure_running()?;
        let input = &task.input;
        validate_input(input)?;

        let kind = task.kind();
        debug!(
            task_id = %task.id,
            task_kind = %kind,
            bytes = input.text().len(),
            "📥 Task submitted"
        );

        let call_options = options.call_options();
        let cycle = RequestCycle::new();
        let response = with_deadline(
            kind,
            options.timeout_ms,
            self.coordinator.execute_with(input, &call_options, &cycle),
        )
        .instrument(info_span!("task", task_id = %task.id))
        .await;

        if let Some(callback) = &options.progress_callback {
            callback(&BatchProgress {
                completed_units: 1,
                total_units: 1,
                batch_index: 0,
                total_batches: 1,
                errors: Vec::new(),
            });
        }
        response
    }

    /// Execute many independent tasks with bounded concurrency. Output order
    /// matches input order.
    pub async fn submit_batch(
        &self,
        inputs: Vec<TaskInput>,
        options: &SubmitOptions,
    ) -> AiResult<BatchResult<TaskOutput>> {
        self.ensure_running()?;
        info!(items = inputs.len(), "📥 Batch submitted");

        let call_options = &options.call_options();
        let timeout_ms = options.timeout_ms;
        let result = self
            .scheduler
            .run(inputs, &options.batch_options(), move |input: &TaskInput, _index| {
                let input = input.clone();
                async move { self.run_item(&input, call_options, timeout_ms, None).await }
            })
            .await;
        Ok(result)
    }

    /// Execute one task over long text: chunk at sentence boundaries, process
    /// the chunks as a batch and reassemble the outputs in order
    pub async fn submit_document(
        &self,
        input: TaskInput,
        options: &SubmitOptions,
    ) -> AiResult<TaskOutput> {
        self.ensure_running()?;
        validate_input(&input)?;

        let kind = input.kind();
        let target = self.config.batch.chunk_target_chars;
        if !kind.is_chunkable() || input.text().chars().count() <= target {
            return self
                .submit_task(input, options)
                .await
                .map(|response| response.output);
        }

        let chunks = chunk_text(input.text(), target);
        info!(task_kind = %kind, chunks = chunks.len(), "📄 Document split into chunks");

        let inputs: Vec<TaskInput> = chunks.iter().map(|chunk| input.with_text(chunk.as_str())).collect();
        let call_options = &options.call_options();
        let timeout_ms = options.timeout_ms;
        let cycle = &RequestCycle::new();
        let result = self
            .scheduler
            .run(inputs, &options.batch_options(), move |chunk: &TaskInput, _index| {
                let chunk = chunk.clone();
                async move {
                    self.run_item(&chunk, call_options, timeout_ms, Some(cycle))
                        .await
                }
            })
            .await;

        merge_chunk_outputs(kind, result.into_all()?)
    }

    /// Language of `source`. A declared language is trusted without any
    /// provider call.
    pub async fn detect_language(
        &self,
        source: &ContentSource,
        options: &SubmitOptions,
    ) -> AiResult<DetectedLanguage> {
        if let Some(language) = &source.declared_language {
            debug!(language = %language, "Using declared language");
            return Ok(DetectedLanguage {
                language: language.clone(),
                confidence: DECLARED_LANGUAGE_CONFIDENCE,
            });
        }

        let response = self
            .submit_task(
                TaskInput::LanguageDetection {
                    text: source.text.clone(),
                },
                options,
            )
            .await?;
        match response.output {
            TaskOutput::LanguageDetection(detected) => Ok(detected),
            other => Err(AiError::processing_failed(format!(
                "expected language detection output, got {}",
                other.kind()
            ))),
        }
    }

    /// Drop cached results and provider statuses
    pub async fn reset(&self) {
        self.cache.clear().await;
        self.status.clear().await;
        info!("🔄 Orchestrator state reset");
    }

    /// Stop accepting work and tear down the worker realm, cancelling
    /// anything still pending there. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown().await;
        }
        info!("🛑 Orchestrator shut down");
    }

    async fn run_item(
        &self,
        input: &TaskInput,
        call_options: &CallOptions,
        timeout_ms: Option<u64>,
        cycle: Option<&RequestCycle>,
    ) -> AiResult<TaskOutput> {
        validate_input(input)?;
        let own_cycle;
        let cycle = match cycle {
            Some(cycle) => cycle,
            None => {
                own_cycle = RequestCycle::new();
                &own_cycle
            }
        };
        with_deadline(
            input.kind(),
            timeout_ms,
            self.coordinator.execute_with(input, call_options, cycle),
        )
        .await
        .map(|response| response.output)
    }

    fn ensure_running(&self) -> AiResult<()> {
        if self.is_shut_down() {
            return Err(AiError::cancelled("orchestrator is shut down"));
        }
        Ok(())
    }
}

async fn with_deadline<T>(
    kind: TaskKind,
    timeout_ms: Option<u64>,
    work: impl Future<Output = AiResult<T>>,
) -> AiResult<T> {
    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), work)
            .await
            .unwrap_or_else(|_| {
                Err(AiError::processing_failed(format!(
                    "{kind} task timed out after {ms}ms"
                )))
            }),
        None => work.await,
    }
}

fn validate_input(input: &TaskInput) -> AiResult<()> {
    if input.text().trim().is_empty() {
        return Err(AiError::invalid_input(format!(
            "{} task requires non-empty text",
            input.kind()
        )));
    }
    if let TaskInput::Translation {
        target_language, ..
    } = input
    {
        if target_language.trim().is_empty() {
            return Err(AiError::invalid_input("translation requires a target language"));
        }
    }
    Ok(())
}

/// Concatenate per-chunk outputs of a chunkable kind into one output
fn merge_chunk_outputs(kind: TaskKind, outputs: Vec<TaskOutput>) -> AiResult<TaskOutput> {
    let texts: Vec<&str> = outputs.iter().filter_map(TaskOutput::text).collect();
    if texts.len() != outputs.len() {
        return Err(AiError::processing_failed(format!(
            "{kind} chunk produced an output without text"
        )));
    }
    let text = reassemble(&texts);

    match kind {
        TaskKind::Summarization => Ok(TaskOutput::Summarization { summary: text }),
        TaskKind::Rewrite => Ok(TaskOutput::Rewrite { text }),
        TaskKind::Translation => {
            let detected_source_language = outputs.iter().find_map(|output| match output {
                TaskOutput::Translation {
                    detected_source_language,
                    ..
                } => detected_source_language.clone(),
                _ => None,
            });
            Ok(TaskOutput::Translation {
                text,
                detected_source_language,
            })
        }
        TaskKind::LanguageDetection | TaskKind::VocabularyAnalysis => Err(
            AiError::invalid_input(format!("{kind} tasks are not processed in chunks")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_text() {
        let error = validate_input(&TaskInput::LanguageDetection {
            text: "   ".to_string(),
        })
        .unwrap_err();
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_merge_translation_keeps_detected_language() {
        let merged = merge_chunk_outputs(
            TaskKind::Translation,
            vec![
                TaskOutput::Translation {
                    text: "Hello.".to_string(),
                    detected_source_language: Some("es".to_string()),
                },
                TaskOutput::Translation {
                    text: "Goodbye.".to_string(),
                    detected_source_language: None,
                },
            ],
        )
        .unwrap();

        assert_eq!(
            merged,
            TaskOutput::Translation {
                text: "Hello. Goodbye.".to_string(),
                detected_source_language: Some("es".to_string()),
            }
        );
    }

    #[test]
    fn test_max_retries_maps_to_attempt_budget() {
        let options = SubmitOptions {
            max_retries: Some(2),
            ..SubmitOptions::default()
        };
        assert_eq!(options.call_options().max_attempts, Some(3));
    }

    #[tokio::test]
    async fn test_declared_language_short_circuits() {
        let orchestrator = OrchestratorBuilder::new().build().unwrap();
        let source = ContentSource::new("Bonjour").with_declared_language("fr");
        let detected = orchestrator
            .detect_language(&source, &SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(detected.language, "fr");
        assert_eq!(detected.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_rejects_work() {
        let orchestrator = OrchestratorBuilder::new().build().unwrap();
        orchestrator.shutdown().await;
        orchestrator.shutdown().await;

        let error = orchestrator
            .submit_task(
                TaskInput::LanguageDetection {
                    text: "hi".to_string(),
                },
                &SubmitOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(error.message().contains("shut down"));
    }
}
