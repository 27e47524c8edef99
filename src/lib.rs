#![allow(clippy::doc_markdown)] // Allow technical terms like FNV-1a, BCP-47 in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # TextFlow Core
//!
//! Orchestration core for natural-language AI tasks: language detection,
//! summarization, rewriting, translation and vocabulary analysis.
//!
//! ## Overview
//!
//! The crate executes requests against one or more external providers under
//! partial failure, rate limiting and variable latency, while avoiding
//! redundant work. The providers themselves, the persistent storage engine
//! and any UI live outside the crate and are reached through traits.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! - [`resilience`]: `RetryExecutor` (backoff + jitter) and `ConcurrencyGate`
//!   (FIFO counting semaphore)
//! - [`cache`]: content-addressable `ResultCache` with TTL and LRU byte budget
//! - [`execution`]: `WorkerDispatcher` for isolated realm calls with
//!   timeout and cancellation
//! - [`orchestration`]: `ServiceCoordinator` fallback chain, `BatchScheduler`
//!   and the caller-facing `Orchestrator`
//!
//! Ambient modules: [`config`] (YAML + environment overrides), [`error`]
//! (classified `AiError`), [`logging`] (structured tracing), [`types`]
//! (tagged task inputs and outputs) and [`constants`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use textflow_core::config::ConfigManager;
//! use textflow_core::orchestration::{OrchestratorBuilder, Provider, SubmitOptions};
//! use textflow_core::types::{RewriteStyle, TaskInput};
//! use std::sync::Arc;
//!
//! # async fn example(provider: Arc<dyn Provider>) -> Result<(), Box<dyn std::error::Error>> {
//! textflow_core::logging::init_structured_logging();
//!
//! let manager = ConfigManager::load_or_default(None);
//! let orchestrator = OrchestratorBuilder::new()
//!     .config(manager.config().clone())
//!     .provider(provider)
//!     .build()?;
//!
//! let input = TaskInput::Rewrite {
//!     text: "The committee has reached a consensus.".into(),
//!     style: RewriteStyle::Simpler,
//! };
//! match orchestrator.submit_task(input, &SubmitOptions::default()).await {
//!     Ok(response) => println!("{:?}", response.output),
//!     Err(error) if error.is_retryable() => println!("try again later: {error}"),
//!     Err(error) => println!("failed: {error}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod types;

pub use cache::{ResultCache, KeyValueStore};
pub use config::{ConfigManager, OrchestratorConfig};
pub use error::{AiError, AiErrorKind, AiResult, ErrorReport, ProviderFailure};
pub use execution::WorkerDispatcher;
pub use orchestration::{
    BatchResult, Orchestrator, OrchestratorBuilder, Provider, ProviderResponse,
    ServiceCoordinator, SubmitOptions,
};
pub use resilience::{ConcurrencyGate, RetryExecutor, RetryPolicy};
pub use types::{ContentSource, Task, TaskInput, TaskKind, TaskOutput};
