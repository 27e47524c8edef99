//! # Concurrency Gate
//!
//! Counting semaphore bounding simultaneous in-flight operations.
//!
//! Backed by [`tokio::sync::Semaphore`], which is fair: a released permit is
//! assigned to the oldest queued waiter before it becomes free, so a newly
//! arriving caller never overtakes one that is already queued. Permits are
//! RAII guards and go back to the gate on every exit path, including panics
//! and cancelled futures.
//!
//! ```rust
//! use textflow_core::resilience::ConcurrencyGate;
//!
//! # tokio_test::block_on(async {
//! let gate = ConcurrencyGate::new("docs", 1);
//! let permit = gate.acquire().await.unwrap();
//! assert!(gate.try_acquire().is_none());
//!
//! drop(permit);
//! assert_eq!(gate.available_permits(), 1);
//! # });
//! ```

use crate::error::{AiError, AiResult};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

/// Counting semaphore with FIFO hand-off
#[derive(Clone)]
pub struct ConcurrencyGate {
    name: Arc<str>,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
}

impl fmt::Debug for ConcurrencyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGate")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &self.available_permits())
            .field("waiting", &self.waiting())
            .finish()
    }
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `capacity` holders (minimum 1)
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: Arc::from(name.into()),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Callers currently queued for a permit
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available_permits())
    }

    /// Wait for a permit. Fails only if the gate is closed.
    pub async fn acquire(&self) -> AiResult<GatePermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => return Ok(GatePermit::new(permit)),
            Err(TryAcquireError::Closed) => return Err(self.closed_error()),
            Err(TryAcquireError::NoPermits) => {}
        }

        debug!(gate = %self.name, "⏳ Waiting for concurrency permit");

        let _queued = QueuedWaiter::enter(&self.waiting);
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(GatePermit::new)
            .map_err(|_| self.closed_error())
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(GatePermit::new)
    }

    /// Run `operation` while holding a permit; the permit is released however
    /// the operation ends
    pub async fn run<T, F, Fut>(&self, operation: F) -> AiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AiResult<T>>,
    {
        let _permit = self.acquire().await?;
        operation().await
    }

    /// Reject current and future waiters. Permits already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    fn closed_error(&self) -> AiError {
        AiError::cancelled(format!("concurrency gate '{}' is closed", self.name))
    }
}

/// Keeps the waiter count honest when an acquire future is dropped
struct QueuedWaiter<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> QueuedWaiter<'a> {
    fn enter(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self { waiting }
    }
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Held permit; returns itself to the gate on drop
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        Self { _permit: permit }
    }
}

impl fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePermit").finish_non_exhaustive()
    }
}
