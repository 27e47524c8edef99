//! # Orchestration
//!
//! Multi-provider task execution.
//!
//! ## Core Components
//!
//! - **Provider**: uniform call contract for one external AI capability
//! - **ProviderStatusRegistry**: cached availability checks with a bounded
//!   staleness window
//! - **ServiceCoordinator**: ordered fallback chain with retry, caching and
//!   compound error aggregation
//! - **BatchScheduler**: order-preserving, bounded-concurrency batch runs
//!   with per-batch progress
//! - **Orchestrator**: caller-facing `submit_task` / `submit_batch` /
//!   `submit_document` API and lifecycle
//!
//! ## Request Flow
//!
//! ```text
//! submit_task ─▶ ServiceCoordinator ─▶ ResultCache hit? ─yes─▶ response
//!                      │no
//!                      ▼
//!              for provider in chain:
//!                supports? available? ─▶ RetryExecutor(provider.call)
//!                      │ all failed
//!                      ▼
//!              compound AiError
//! ```

pub mod batch;
pub mod chunking;
pub mod coordinator;
pub mod orchestrator;
pub mod provider;
pub mod provider_status;

pub use batch::{
    partition, BatchItemError, BatchOptions, BatchProgress, BatchResult, BatchScheduler,
    ProgressCallback,
};
pub use chunking::{chunk_text, reassemble, split_sentences};
pub use coordinator::{
    CallOptions, ProviderResponse, RequestCycle, RequestState, ServiceCoordinator,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SubmitOptions};
pub use provider::{CallContext, Provider, ProviderTier};
pub use provider_status::{ProviderStatus, ProviderStatusRegistry};
