//! # Batch Scheduler
//!
//! Splits large workloads into contiguous batches and runs them concurrently
//! under a [`ConcurrencyGate`].
//!
//! ## Guarantees
//!
//! - Output slot `i` always holds the result of input item `i`, whatever
//!   order the calls complete in.
//! - A failing item is recorded and never aborts the rest of its batch or any
//!   sibling batch.
//! - The progress callback fires once per finished batch with cumulative
//!   counts.
//! - At most `concurrency_limit` batches hold a gate permit at once. Items
//!   inside a batch run one after another, so the same bound applies to
//!   in-flight item calls.

use crate::config::BatchConfig;
use crate::error::{AiError, AiResult};
use crate::logging::log_batch_operation;
use crate::resilience::{ConcurrencyGate, RetryExecutor};
use futures::future::join_all;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One failed item, addressed by its position in the original input
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemError {
    pub index: usize,
    pub error: AiError,
}

/// Incremental status of a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchProgress {
    pub completed_units: usize,
    pub total_units: usize,
    /// Index of the batch whose completion produced this update
    pub batch_index: usize,
    pub total_batches: usize,
    pub errors: Vec<BatchItemError>,
}

impl BatchProgress {
    pub fn fraction(&self) -> f64 {
        if self.total_units == 0 {
            1.0
        } else {
            self.completed_units as f64 / self.total_units as f64
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// Ordered outcome of a batch run
#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    /// One slot per input item; `None` where the item failed
    pub outputs: Vec<Option<T>>,
    /// Failures ordered by item index
    pub errors: Vec<BatchItemError>,
    pub progress: BatchProgress,
}

impl<T> BatchResult<T> {
    pub fn succeeded(&self) -> usize {
        self.outputs.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// All outputs in order, or the first failure
    pub fn into_all(self) -> AiResult<Vec<T>> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(first.error);
        }
        Ok(self.outputs.into_iter().flatten().collect())
    }
}

/// Per-run options
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Concurrent batches; the scheduler's configured limit when `None`
    pub concurrency_limit: Option<usize>,
    /// Attempt budget per item; the scheduler's retry policy when `None`
    pub max_attempts: Option<u32>,
    pub progress_callback: Option<ProgressCallback>,
    pub cancellation: Option<CancellationToken>,
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("concurrency_limit", &self.concurrency_limit)
            .field("max_attempts", &self.max_attempts)
            .field("has_progress_callback", &self.progress_callback.is_some())
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

/// Split `items` into contiguous batches of at most `batch_size`
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        batches.push(items.by_ref().take(batch_size).collect());
    }
    batches
}

struct RunState<R> {
    outputs: Vec<Option<R>>,
    errors: Vec<BatchItemError>,
    completed_units: usize,
}

/// Bounded-concurrency batch executor
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    config: BatchConfig,
    retry: RetryExecutor,
}

impl BatchScheduler {
    pub fn new(config: BatchConfig, retry: RetryExecutor) -> Self {
        Self { config, retry }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Partition `items` with the configured batch size and process them
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        options: &BatchOptions,
        operation: F,
    ) -> BatchResult<R>
    where
        F: Fn(&T, usize) -> Fut,
        Fut: Future<Output = AiResult<R>>,
    {
        let batches = partition(items, self.config.batch_size);
        self.process_batches(batches, options, operation).await
    }

    /// Run every batch, at most `concurrency_limit` at a time. `operation`
    /// receives the item and its position in the flattened input.
    pub async fn process_batches<T, R, F, Fut>(
        &self,
        batches: Vec<Vec<T>>,
        options: &BatchOptions,
        operation: F,
    ) -> BatchResult<R>
    where
        F: Fn(&T, usize) -> Fut,
        Fut: Future<Output = AiResult<R>>,
    {
        let total_batches = batches.len();
        let total_units: usize = batches.iter().map(Vec::len).sum();
        let concurrency_limit = options
            .concurrency_limit
            .unwrap_or(self.config.concurrency_limit)
            .max(1);
        let retry = match options.max_attempts {
            Some(max_attempts) => self.retry.with_max_attempts(max_attempts),
            None => self.retry.clone(),
        };

        info!(
            total_units = total_units,
            total_batches = total_batches,
            concurrency_limit = concurrency_limit,
            "📦 Starting batch run"
        );

        let gate = ConcurrencyGate::new("batch_scheduler", concurrency_limit);
        let state = Mutex::new(RunState {
            outputs: std::iter::repeat_with(|| None).take(total_units).collect(),
            errors: Vec::new(),
            completed_units: 0,
        });

        let mut offset = 0;
        let mut runs = Vec::with_capacity(total_batches);
        for (batch_index, batch) in batches.into_iter().enumerate() {
            let batch_offset = offset;
            offset += batch.len();

            let gate = &gate;
            let state = &state;
            let retry = &retry;
            let operation = &operation;

            runs.push(async move {
                let permit = gate.acquire().await;
                let mut results = Vec::with_capacity(batch.len());

                for (position, item) in batch.iter().enumerate() {
                    let index = batch_offset + position;
                    let result = match (&permit, options.cancellation.as_ref()) {
                        (Err(e), _) => Err(e.clone()),
                        (Ok(_), Some(token)) if token.is_cancelled() => {
                            Err(AiError::cancelled("batch run cancelled"))
                        }
                        // A single attempt keeps the operation's own error untouched
                        (Ok(_), _) if retry.policy().max_attempts <= 1 => {
                            operation(item, index).await
                        }
                        (Ok(_), token) => {
                            retry
                                .execute_with_cancellation(|_attempt| operation(item, index), token)
                                .await
                        }
                    };
                    results.push((index, result));
                }
                drop(permit);

                let progress = {
                    let mut state = state.lock();
                    for (index, result) in results {
                        match result {
                            Ok(output) => state.outputs[index] = Some(output),
                            Err(error) => state.errors.push(BatchItemError { index, error }),
                        }
                        state.completed_units += 1;
                    }
                    BatchProgress {
                        completed_units: state.completed_units,
                        total_units,
                        batch_index,
                        total_batches,
                        errors: state.errors.clone(),
                    }
                };

                log_batch_operation(
                    "batch_complete",
                    batch_index,
                    total_batches,
                    progress.completed_units,
                    total_units,
                    progress.errors.len(),
                );
                if let Some(callback) = &options.progress_callback {
                    callback(&progress);
                }
            });
        }

        join_all(runs).await;

        let RunState {
            outputs,
            mut errors,
            completed_units,
        } = state.into_inner();
        errors.sort_by_key(|e| e.index);

        debug!(
            completed_units = completed_units,
            failed = errors.len(),
            "Batch run finished"
        );

        BatchResult {
            outputs,
            progress: BatchProgress {
                completed_units,
                total_units,
                batch_index: total_batches.saturating_sub(1),
                total_batches,
                errors: errors.clone(),
            },
            errors,
        }
    }
}
