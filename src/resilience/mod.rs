//! # Resilience Module
//!
//! Fault tolerance primitives shared by the coordinator, the batch scheduler
//! and the worker dispatcher.
//!
//! ## Architecture
//!
//! - **Retry**: bounded attempts with exponential backoff and jitter, driven
//!   only by the classified `retryable` flag
//! - **Concurrency Gate**: counting semaphore with FIFO permit hand-off and
//!   guaranteed release
//!
//! ## Usage
//!
//! ```rust,no_run
//! use textflow_core::resilience::{ConcurrencyGate, RetryExecutor, RetryPolicy};
//! use textflow_core::error::AiResult;
//! use std::time::Duration;
//!
//! # async fn example() -> AiResult<()> {
//! let gate = ConcurrencyGate::new("remote_api", 4);
//! let retry = RetryExecutor::new(RetryPolicy::new(
//!     3,
//!     Duration::from_millis(500),
//!     Duration::from_secs(5),
//! ));
//!
//! let value = gate
//!     .run(|| retry.execute(|_attempt| async { Ok::<_, textflow_core::AiError>(42) }))
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod gate;
pub mod retry;

pub use gate::{ConcurrencyGate, GatePermit};
pub use retry::{execute_with_retry, RetryEvent, RetryExecutor, RetryPolicy};
