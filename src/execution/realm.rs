//! # Isolated Execution Realm
//!
//! The dispatcher treats the realm as a black box reached through
//! [`RealmHost::create`], [`Realm::post_message`], [`Realm::close`] and an
//! inbound frame channel. [`TokioRealmHost`] is the in-process host: a
//! dedicated task that decodes task frames, runs each one on a
//! [`WorkerHandler`], and posts the encoded reply back.
//!
//! A panicking handler brings the whole realm down. The inbound channel then
//! closes, which the dispatcher observes as a realm crash.

use super::messages::{RealmReply, RealmRequest};
use crate::error::{AiError, AiResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

/// Sender half the realm uses to deliver reply frames
pub type InboundSender = mpsc::UnboundedSender<String>;

/// Handle to one running realm
#[async_trait]
pub trait Realm: Send + Sync {
    /// Deliver one serialized frame into the realm
    fn post_message(&self, frame: String) -> AiResult<()>;

    fn is_alive(&self) -> bool;

    /// Stop the realm and release its resources. Idempotent.
    async fn close(&self);
}

/// Factory for realms
#[async_trait]
pub trait RealmHost: Send + Sync {
    /// Start a realm that posts its reply frames to `inbound`
    async fn create(&self, inbound: InboundSender) -> AiResult<Arc<dyn Realm>>;
}

/// Work executed inside the realm
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    async fn handle(&self, task_type: &str, data: serde_json::Value) -> AiResult<serde_json::Value>;
}

/// Hosts realms as tokio tasks in the current runtime
#[derive(Clone)]
pub struct TokioRealmHost {
    handler: Arc<dyn WorkerHandler>,
}

impl std::fmt::Debug for TokioRealmHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioRealmHost").finish_non_exhaustive()
    }
}

impl TokioRealmHost {
    pub fn new(handler: Arc<dyn WorkerHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl RealmHost for TokioRealmHost {
    async fn create(&self, inbound: InboundSender) -> AiResult<Arc<dyn Realm>> {
        let (outbound, frames) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_realm(Arc::clone(&self.handler), frames, inbound));
        debug!("🧵 Worker realm started");
        Ok(Arc::new(TokioRealm {
            outbound,
            handle: Mutex::new(Some(handle)),
        }))
    }
}

struct TokioRealm {
    outbound: mpsc::UnboundedSender<String>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Realm for TokioRealm {
    fn post_message(&self, frame: String) -> AiResult<()> {
        self.outbound
            .send(frame)
            .map_err(|_| AiError::processing_failed("worker realm is not accepting messages"))
    }

    fn is_alive(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn close(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            // Aborting drops the JoinSet, which aborts every running handler
            let _ = handle.await;
            debug!("Worker realm closed");
        }
    }
}

async fn run_realm(
    handler: Arc<dyn WorkerHandler>,
    mut frames: mpsc::UnboundedReceiver<String>,
    inbound: InboundSender,
) {
    let mut running: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                match serde_json::from_str::<RealmRequest>(&frame) {
                    Ok(RealmRequest::Task(task)) => {
                        let handler = Arc::clone(&handler);
                        let inbound = inbound.clone();
                        running.spawn(async move {
                            let result = handler.handle(&task.task_type, task.data).await;
                            let reply = RealmReply::from_result(task.id, result);
                            match serde_json::to_string(&reply) {
                                Ok(encoded) => {
                                    // Receiver gone means the dispatcher is tearing down
                                    let _ = inbound.send(encoded);
                                }
                                Err(e) => error!(error = %e, "Failed to encode worker reply"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed frame sent to worker realm"),
                }
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "💥 Worker handler panicked, terminating realm");
                        break;
                    }
                }
            }
        }
    }

    running.shutdown().await;
}
