//! Worker dispatcher correlation, deadlines and teardown over the tokio realm

mod common;

use async_trait::async_trait;
use common::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use textflow_core::config::WorkerConfig;
use textflow_core::error::{AiError, AiErrorKind, AiResult};
use textflow_core::execution::{
    IsolatedProvider, ProviderWorkerHandler, TokioRealmHost, WorkerDispatcher, WorkerHandler,
};
use textflow_core::orchestration::Provider;
use textflow_core::types::TaskOutput;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handler whose behaviour is chosen by the task type
#[derive(Default)]
struct TestHandler {
    started: AtomicUsize,
}

#[async_trait]
impl WorkerHandler for TestHandler {
    async fn handle(&self, task_type: &str, data: Value) -> AiResult<Value> {
        self.started.fetch_add(1, Ordering::SeqCst);
        match task_type {
            "echo" => Ok(data),
            "sleep" => {
                let ms = data["ms"].as_u64().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!({ "slept": ms }))
            }
            "rate_limited" => Err(AiError::rate_limited("quota exhausted")),
            "crash" => panic!("realm crash requested"),
            other => Err(AiError::processing_failed(format!("unknown task type '{other}'"))),
        }
    }
}

fn dispatcher_with(handler: Arc<TestHandler>, capacity: usize, timeout_ms: u64) -> WorkerDispatcher {
    WorkerDispatcher::new(
        Arc::new(TokioRealmHost::new(handler)),
        &WorkerConfig {
            max_concurrent_tasks: capacity,
            default_timeout_ms: timeout_ms,
        },
    )
}

#[tokio::test]
async fn test_concurrent_dispatches_receive_their_own_replies() {
    let dispatcher = dispatcher_with(Arc::new(TestHandler::default()), 8, 5_000);

    let calls = (0..16).map(|n| {
        let dispatcher = dispatcher.clone();
        async move { dispatcher.dispatch("echo", json!({ "n": n })).await }
    });
    let replies = futures::future::join_all(calls).await;

    for (n, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.unwrap(), json!({ "n": n }));
    }
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_error_classification_survives_the_boundary() {
    let dispatcher = dispatcher_with(Arc::new(TestHandler::default()), 2, 5_000);

    let error = dispatcher
        .dispatch("rate_limited", json!({}))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), AiErrorKind::RateLimited);
    assert!(error.is_retryable());
    assert_eq!(error.message(), "quota exhausted");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_at_the_deadline_and_late_reply_is_ignored() {
    let dispatcher = dispatcher_with(Arc::new(TestHandler::default()), 2, 5_000);
    let started = Instant::now();

    let error = dispatcher
        .dispatch_with(
            "sleep",
            json!({ "ms": 500 }),
            Some(Duration::from_millis(200)),
            None,
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(error.kind(), AiErrorKind::ProcessingFailed);
    assert!(error.message().contains("timed out after 200ms"));
    assert_eq!(dispatcher.pending_count(), 0);

    // The handler still finishes and replies; nothing is left to complete
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(dispatcher.pending_count(), 0);
    let next = dispatcher.dispatch("echo", json!("after")).await.unwrap();
    assert_eq!(next, json!("after"));
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_settles_only_that_task() {
    let dispatcher = dispatcher_with(Arc::new(TestHandler::default()), 4, 5_000);
    let token = CancellationToken::new();

    let cancelled = {
        let dispatcher = dispatcher.clone();
        let token = token.clone();
        tokio::spawn(async move {
            dispatcher
                .dispatch_with("sleep", json!({ "ms": 1_000 }), None, Some(&token))
                .await
        })
    };
    let survivor = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch("sleep", json!({ "ms": 300 })).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let error = cancelled.await.unwrap().unwrap_err();
    assert!(error.message().starts_with("cancelled:"));
    assert_eq!(survivor.await.unwrap().unwrap(), json!({ "slept": 300 }));
}

#[tokio::test(start_paused = true)]
async fn test_capacity_queues_excess_dispatches() {
    let handler = Arc::new(TestHandler::default());
    let dispatcher = dispatcher_with(Arc::clone(&handler), 2, 5_000);

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch("sleep", json!({ "ms": 100 })).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.started.load(Ordering::SeqCst), 2);

    for call in calls {
        call.await.unwrap().unwrap();
    }
    assert_eq!(handler.started.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_realm_crash_fails_in_flight_work_and_recovers() {
    let dispatcher = dispatcher_with(Arc::new(TestHandler::default()), 4, 10_000);

    let in_flight = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch("sleep", json!({ "ms": 5_000 })).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let crash = dispatcher.dispatch("crash", json!({})).await.unwrap_err();
    assert_eq!(crash.kind(), AiErrorKind::ProcessingFailed);

    let error = in_flight.await.unwrap().unwrap_err();
    assert!(error.message().contains("terminated unexpectedly"));

    let recovered = dispatcher.dispatch("echo", json!(1)).await.unwrap();
    assert_eq!(recovered, json!(1));
    assert!(dispatcher.is_realm_alive().await);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_pending_and_new_work() {
    let dispatcher = dispatcher_with(Arc::new(TestHandler::default()), 4, 10_000);

    let pending = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch("sleep", json!({ "ms": 5_000 })).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    dispatcher.shutdown().await;
    dispatcher.shutdown().await;

    let error = pending.await.unwrap().unwrap_err();
    assert!(error.message().starts_with("cancelled:"));
    assert!(dispatcher.dispatch("echo", json!(1)).await.is_err());
    assert!(!dispatcher.is_realm_alive().await);
}

#[tokio::test]
async fn test_isolated_provider_round_trips_task_io() {
    let remote = ScriptedProvider::new("sandboxed").into_arc();
    let mut handler = ProviderWorkerHandler::new();
    handler.register(remote.clone());

    let dispatcher = WorkerDispatcher::new(
        Arc::new(TokioRealmHost::new(Arc::new(handler))),
        &WorkerConfig::default(),
    );
    let isolated = IsolatedProvider::new(remote.clone(), dispatcher.clone());

    assert_eq!(isolated.id(), "sandboxed");
    assert!(isolated.check_availability().await);

    let output = isolated.call(&rewrite_input("quiet words")).await.unwrap();
    assert_eq!(
        output,
        TaskOutput::Rewrite {
            text: "QUIET WORDS".to_string()
        }
    );
    assert_eq!(remote.calls(), 1);

    dispatcher.shutdown().await;
    assert!(!isolated.check_availability().await);
}

#[tokio::test]
async fn test_isolated_provider_asks_the_wrapped_provider() {
    let down = ScriptedProvider::new("down").unavailable().into_arc();
    let mut handler = ProviderWorkerHandler::new();
    handler.register(down.clone());

    let dispatcher = WorkerDispatcher::new(
        Arc::new(TokioRealmHost::new(Arc::new(handler))),
        &WorkerConfig::default(),
    );
    let isolated = IsolatedProvider::new(down.clone(), dispatcher);

    assert!(!isolated.check_availability().await);
    assert_eq!(down.availability_checks(), 1);
    assert_eq!(down.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_queued_dispatch_times_out_behind_a_full_realm() {
    let dispatcher = dispatcher_with(Arc::new(TestHandler::default()), 1, 10_000);
    let occupant = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.dispatch("sleep", json!({ "ms": 2_000 })).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = Instant::now();
    let error = dispatcher
        .dispatch_with("echo", json!(1), Some(Duration::from_millis(300)), None)
        .await
        .unwrap_err();

    assert!(error.message().contains("timed out after 300ms"));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_millis(2_000));
    assert_eq!(occupant.await.unwrap().unwrap(), json!({ "slept": 2_000 }));
}
