use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use textflow_core::cache::{KeyValueStore, StoreError, StoreResult};
use textflow_core::error::{AiError, AiResult};
use textflow_core::orchestration::{Provider, ProviderTier};
use textflow_core::types::{DetectedLanguage, TaskInput, TaskKind, TaskOutput};

/// Provider that replays a fixed script of results, then falls back to a
/// default behaviour
pub struct ScriptedProvider {
    id: String,
    tier: ProviderTier,
    supported: Vec<TaskKind>,
    script: Mutex<VecDeque<AiResult<TaskOutput>>>,
    fallback: Option<AiError>,
    available: AtomicBool,
    calls: AtomicU32,
    availability_checks: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tier: ProviderTier::Local,
            supported: TaskKind::ALL.to_vec(),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            available: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            availability_checks: AtomicU32::new(0),
            delay: None,
        }
    }

    pub fn remote(mut self) -> Self {
        self.tier = ProviderTier::Remote;
        self
    }

    pub fn supporting(mut self, kinds: &[TaskKind]) -> Self {
        self.supported = kinds.to_vec();
        self
    }

    /// Queue results returned by successive calls
    pub fn then(self, result: AiResult<TaskOutput>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    /// Fail every call once the script is exhausted
    pub fn always_failing(mut self, error: AiError) -> Self {
        self.fallback = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn availability_checks(&self) -> u32 {
        self.availability_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn tier(&self) -> ProviderTier {
        self.tier
    }

    fn supports(&self, kind: TaskKind) -> bool {
        self.supported.contains(&kind)
    }

    async fn check_availability(&self) -> bool {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn call(&self, input: &TaskInput) -> AiResult<TaskOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => match &self.fallback {
                Some(error) => Err(error.clone()),
                None => Ok(echo_output(&self.id, input)),
            },
        }
    }
}

/// Deterministic output derived from the input, tagged with the provider id
pub fn echo_output(provider_id: &str, input: &TaskInput) -> TaskOutput {
    match input {
        TaskInput::LanguageDetection { .. } => TaskOutput::LanguageDetection(DetectedLanguage {
            language: "en".to_string(),
            confidence: 0.9,
        }),
        TaskInput::Summarization { text, .. } => TaskOutput::Summarization {
            summary: format!("[{provider_id}] {}", text.trim()),
        },
        TaskInput::Rewrite { text, .. } => TaskOutput::Rewrite {
            text: text.to_uppercase(),
        },
        TaskInput::Translation { text, .. } => TaskOutput::Translation {
            text: text.trim().to_string(),
            detected_source_language: Some("es".to_string()),
        },
        TaskInput::VocabularyAnalysis { .. } => TaskOutput::VocabularyAnalysis {
            entries: Vec::new(),
        },
    }
}

pub fn rewrite_input(text: &str) -> TaskInput {
    TaskInput::Rewrite {
        text: text.to_string(),
        style: textflow_core::types::RewriteStyle::Simpler,
    }
}

pub fn rewrite_output(text: &str) -> TaskOutput {
    TaskOutput::Rewrite {
        text: text.to_string(),
    }
}

/// Key-value store whose every operation fails
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::BackendError("store offline".to_string()))
    }

    async fn set(&self, _key: &str, _value: String) -> StoreResult<()> {
        Err(StoreError::BackendError("store offline".to_string()))
    }

    async fn remove(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::BackendError("store offline".to_string()))
    }

    async fn clear(&self) -> StoreResult<()> {
        Err(StoreError::BackendError("store offline".to_string()))
    }

    fn store_name(&self) -> &'static str {
        "failing"
    }
}
