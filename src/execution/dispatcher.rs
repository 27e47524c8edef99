//! # Worker Dispatcher
//!
//! Ships task descriptors into a single isolated realm and correlates the
//! asynchronous replies.
//!
//! ## Lifecycle of one dispatch
//!
//! 1. Start the per-task deadline
//! 2. Acquire a slot on the realm's concurrency gate
//! 3. Create the realm if none is running (lazy, reused afterwards)
//! 4. Register a pending completion under a fresh correlation id
//! 5. Post the encoded [`WorkerTask`] frame
//! 6. Settle on the first of: matching reply, timeout, caller
//!    cancellation, dispatcher teardown or realm crash
//!
//! The deadline and caller cancellation apply from step 1, so a dispatch
//! still queued behind a full realm is bounded as well.
//!
//! Completion is idempotent per id. The pending record is removed by
//! whichever outcome wins, so a reply that arrives afterwards finds nothing
//! to complete and is dropped. Dropping the dispatch future also removes its
//! record.

use super::messages::{RealmReply, RealmRequest, WorkerTask};
use super::realm::{Realm, RealmHost};
use crate::config::WorkerConfig;
use crate::error::{AiError, AiResult};
use crate::logging::log_error;
use crate::resilience::ConcurrencyGate;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Completion = oneshot::Sender<AiResult<serde_json::Value>>;

struct PendingTask {
    generation: u64,
    task_type: String,
    completion: Completion,
}

struct ActiveRealm {
    realm: Arc<dyn Realm>,
    generation: u64,
    listener: JoinHandle<()>,
}

struct DispatcherInner {
    host: Arc<dyn RealmHost>,
    gate: ConcurrencyGate,
    default_timeout: Duration,
    realm: tokio::sync::Mutex<Option<ActiveRealm>>,
    pending: Mutex<HashMap<String, PendingTask>>,
    generation: AtomicU64,
    shut_down: AtomicBool,
}

impl DispatcherInner {
    /// Settle `id` with `result`; returns false if it was already settled
    fn complete(&self, id: &str, result: AiResult<serde_json::Value>) -> bool {
        let Some(pending) = self.pending.lock().remove(id) else {
            debug!(task_id = %id, "Ignoring completion for settled worker task");
            return false;
        };
        // The dispatch future may already be gone; nothing to deliver then
        let _ = pending.completion.send(result);
        true
    }

    /// Fail every pending task, or only those hosted by `generation`
    fn fail_pending(&self, generation: Option<u64>, error: &AiError) -> usize {
        let drained: Vec<PendingTask> = {
            let mut pending = self.pending.lock();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, task)| generation.map_or(true, |g| task.generation == g))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        let count = drained.len();
        for task in drained {
            debug!(task_type = %task.task_type, "Failing pending worker task");
            let _ = task.completion.send(Err(error.clone()));
        }
        count
    }
}

/// Removes the pending record if the dispatch future is dropped early
struct PendingGuard<'a> {
    inner: &'a DispatcherInner,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(&self.id);
    }
}

/// Dispatches work into a lazily created isolated realm
#[derive(Clone)]
pub struct WorkerDispatcher {
    inner: Arc<DispatcherInner>,
}

impl fmt::Debug for WorkerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerDispatcher")
            .field("capacity", &self.inner.gate.capacity())
            .field("default_timeout", &self.inner.default_timeout)
            .field("pending", &self.pending_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl WorkerDispatcher {
    pub fn new(host: Arc<dyn RealmHost>, config: &WorkerConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                host,
                gate: ConcurrencyGate::new("worker_realm", config.max_concurrent_tasks),
                default_timeout: config.default_timeout(),
                realm: tokio::sync::Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Outstanding tasks awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.gate.capacity()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub async fn is_realm_alive(&self) -> bool {
        self.inner
            .realm
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| active.realm.is_alive())
    }

    /// Dispatch with the configured default timeout
    pub async fn dispatch(
        &self,
        task_type: &str,
        data: serde_json::Value,
    ) -> AiResult<serde_json::Value> {
        self.dispatch_with(task_type, data, None, None).await
    }

    /// Serialize `payload`, dispatch it and decode the reply
    pub async fn dispatch_typed<P, R>(
        &self,
        task_type: &str,
        payload: &P,
        timeout: Option<Duration>,
        cancellation: Option<&CancellationToken>,
    ) -> AiResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let data = serde_json::to_value(payload)?;
        let reply = self
            .dispatch_with(task_type, data, timeout, cancellation)
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Dispatch one task and wait for exactly one outcome
    pub async fn dispatch_with(
        &self,
        task_type: &str,
        data: serde_json::Value,
        timeout: Option<Duration>,
        cancellation: Option<&CancellationToken>,
    ) -> AiResult<serde_json::Value> {
        if self.is_shut_down() {
            return Err(AiError::cancelled("worker dispatcher is shut down"));
        }

        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        // The deadline covers queueing for a slot and realm creation too
        let deadline = Instant::now() + timeout;

        let cancelled = async {
            match cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(cancelled);

        let (_permit, realm, generation) = tokio::select! {
            admitted = async {
                let permit = self.inner.gate.acquire().await?;
                let (realm, generation) = self.ensure_realm().await?;
                AiResult::Ok((permit, realm, generation))
            } => admitted?,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(task_type = %task_type, timeout_ms = timeout_ms, "⏰ Worker task timed out before admission");
                return Err(AiError::timeout(task_type, timeout_ms));
            }
            _ = &mut cancelled => {
                return Err(AiError::cancelled(format!("worker task '{task_type}' cancelled while queued")));
            }
        };

        let id = Uuid::new_v4().to_string();
        let (completion, reply) = oneshot::channel();
        self.inner.pending.lock().insert(
            id.clone(),
            PendingTask {
                generation,
                task_type: task_type.to_string(),
                completion,
            },
        );
        let _guard = PendingGuard {
            inner: &self.inner,
            id: id.clone(),
        };
        if self.is_shut_down() {
            // Registered after teardown drained the pending map
            return Err(AiError::cancelled("worker dispatcher shut down"));
        }

        let frame = serde_json::to_string(&RealmRequest::Task(WorkerTask {
            id: id.clone(),
            task_type: task_type.to_string(),
            data,
            timeout_ms,
        }))?;
        realm.post_message(frame)?;

        debug!(task_id = %id, task_type = %task_type, timeout_ms = timeout_ms, "📤 Dispatched worker task");

        tokio::select! {
            outcome = reply => match outcome {
                Ok(result) => result,
                Err(_) => Err(AiError::cancelled(format!("worker task '{task_type}' was abandoned"))),
            },
            _ = tokio::time::sleep_until(deadline) => {
                let error = AiError::timeout(task_type, timeout_ms);
                self.inner.complete(&id, Err(error.clone()));
                warn!(task_id = %id, task_type = %task_type, timeout_ms = timeout_ms, "⏰ Worker task timed out");
                Err(error)
            }
            _ = &mut cancelled => {
                let error = AiError::cancelled(format!("worker task '{task_type}' cancelled by caller"));
                self.inner.complete(&id, Err(error.clone()));
                Err(error)
            }
        }
    }

    /// Reject every pending task, then close the realm. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.gate.close();
        let failed = self
            .inner
            .fail_pending(None, &AiError::cancelled("worker dispatcher shut down"));

        let active = self.inner.realm.lock().await.take();
        if let Some(active) = active {
            active.realm.close().await;
            active.listener.abort();
        }

        info!(cancelled_tasks = failed, "🛑 Worker dispatcher shut down");
    }

    async fn ensure_realm(&self) -> AiResult<(Arc<dyn Realm>, u64)> {
        let mut slot = self.inner.realm.lock().await;

        if let Some(active) = slot.as_ref() {
            if active.realm.is_alive() {
                return Ok((Arc::clone(&active.realm), active.generation));
            }
        }
        if let Some(stale) = slot.take() {
            stale.listener.abort();
            self.inner
                .fail_pending(Some(stale.generation), &realm_crashed());
        }
        if self.is_shut_down() {
            return Err(AiError::cancelled("worker dispatcher is shut down"));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (inbound, frames) = mpsc::unbounded_channel();
        let realm = self.inner.host.create(inbound).await.map_err(|e| {
            log_error("worker_dispatcher", "create_realm", e.message(), None);
            e
        })?;
        let listener = tokio::spawn(listen(Arc::downgrade(&self.inner), frames, generation));

        info!(generation = generation, "🧵 Worker realm created");
        *slot = Some(ActiveRealm {
            realm: Arc::clone(&realm),
            generation,
            listener,
        });
        Ok((realm, generation))
    }
}

fn realm_crashed() -> AiError {
    AiError::processing_failed("worker realm terminated unexpectedly")
}

/// Route reply frames to their pending tasks until the realm goes away
async fn listen(
    inner: std::sync::Weak<DispatcherInner>,
    mut frames: mpsc::UnboundedReceiver<String>,
    generation: u64,
) {
    while let Some(frame) = frames.recv().await {
        let Some(inner) = inner.upgrade() else { return };
        match serde_json::from_str::<RealmReply>(&frame) {
            Ok(reply) => {
                let id = reply.id().to_string();
                inner.complete(&id, reply.into_result());
            }
            Err(e) => warn!(error = %e, "Dropping malformed frame from worker realm"),
        }
    }

    // Channel closed: the realm is gone
    let Some(inner) = inner.upgrade() else { return };
    if inner.shut_down.load(Ordering::SeqCst) {
        return;
    }
    let failed = inner.fail_pending(Some(generation), &realm_crashed());
    log_error(
        "worker_dispatcher",
        "listen",
        "worker realm terminated unexpectedly",
        Some(&format!("generation={generation} failed_tasks={failed}")),
    );
}
