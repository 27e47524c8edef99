//! Batch scheduling and concurrency gating

mod common;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use textflow_core::config::BatchConfig;
use textflow_core::error::{AiError, AiResult};
use textflow_core::orchestration::{BatchOptions, BatchProgress, BatchScheduler};
use textflow_core::resilience::{ConcurrencyGate, RetryExecutor, RetryPolicy};

fn scheduler(batch_size: usize, concurrency_limit: usize) -> BatchScheduler {
    BatchScheduler::new(
        BatchConfig {
            batch_size,
            concurrency_limit,
            ..BatchConfig::default()
        },
        RetryExecutor::new(RetryPolicy::immediate(1)),
    )
}

#[tokio::test(start_paused = true)]
async fn test_outputs_follow_input_order_despite_completion_order() {
    let items: Vec<u64> = (0..23).collect();
    let updates = Arc::new(Mutex::new(Vec::<BatchProgress>::new()));
    let sink = Arc::clone(&updates);
    let options = BatchOptions {
        progress_callback: Some(Arc::new(move |p: &BatchProgress| sink.lock().push(p.clone()))),
        ..BatchOptions::default()
    };

    let result = scheduler(5, 3)
        .run(items, &options, |item: &u64, _index| {
            let item = *item;
            async move {
                // Later items finish first
                tokio::time::sleep(Duration::from_millis(100 - item)).await;
                Ok::<_, AiError>(item * 10)
            }
        })
        .await;

    let expected: Vec<Option<u64>> = (0..23).map(|i| Some(i * 10)).collect();
    assert_eq!(result.outputs, expected);
    assert!(result.is_complete());

    let updates = updates.lock();
    assert_eq!(updates.len(), 5, "ceil(23 / 5) batches");
    let completed: Vec<usize> = updates.iter().map(|p| p.completed_units).collect();
    assert!(completed.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(updates.last().map(|p| p.completed_units), Some(23));
    assert!(updates.iter().all(|p| p.total_batches == 5 && p.total_units == 23));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_calls_never_exceed_limit() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let result = scheduler(2, 3)
        .run((0..20).collect::<Vec<u32>>(), &BatchOptions::default(), |item, _| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let item = *item;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, AiError>(item)
            }
        })
        .await;

    assert_eq!(result.succeeded(), 20);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_failures_are_isolated_and_indexed() {
    let result = scheduler(4, 2)
        .run(
            (0..10).collect::<Vec<u32>>(),
            &BatchOptions::default(),
            |item, _| {
                let item = *item;
                async move {
                    if item % 3 == 0 {
                        Err(AiError::invalid_input(format!("item {item} rejected")))
                    } else {
                        Ok(item)
                    }
                }
            },
        )
        .await;

    let failed: Vec<usize> = result.errors.iter().map(|e| e.index).collect();
    assert_eq!(failed, vec![0, 3, 6, 9]);
    assert_eq!(result.succeeded(), 6);
    assert_eq!(result.outputs[1], Some(1));
    assert_eq!(result.outputs[3], None);
    assert!(result.clone().into_all().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_items_are_retried_up_to_the_budget() {
    let attempts = Arc::new(Mutex::new(vec![0u32; 4]));
    let scheduler = BatchScheduler::new(
        BatchConfig {
            batch_size: 2,
            concurrency_limit: 2,
            ..BatchConfig::default()
        },
        RetryExecutor::new(RetryPolicy::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(100),
        )),
    );

    let result: textflow_core::orchestration::BatchResult<u32> = scheduler
        .run(vec![0u32, 1, 2, 3], &BatchOptions::default(), |item, index| {
            let attempts = Arc::clone(&attempts);
            let item = *item;
            async move {
                let made = {
                    let mut attempts = attempts.lock();
                    attempts[index] += 1;
                    attempts[index]
                };
                match item {
                    1 if made < 3 => Err(AiError::network("flaky")),
                    3 => Err(AiError::network("always down")),
                    _ => Ok(item),
                }
            }
        })
        .await;

    assert_eq!(*attempts.lock(), vec![1, 3, 1, 3]);
    assert_eq!(result.outputs, vec![Some(0), Some(1), Some(2), None]);
    assert_eq!(result.errors[0].error.attempts(), Some(3));
}

#[tokio::test]
async fn test_empty_input_reports_nothing() {
    let calls = AtomicUsize::new(0);
    let result: textflow_core::orchestration::BatchResult<u32> = scheduler(5, 2)
        .run(Vec::<u32>::new(), &BatchOptions::default(), |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(0) }
        })
        .await;

    assert!(result.outputs.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.progress.fraction(), 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_gate_admits_capacity_and_queues_the_rest_in_order() {
    let gate = ConcurrencyGate::new("test", 2);
    let first = gate.acquire().await.unwrap();
    let second = gate.acquire().await.unwrap();
    assert!(gate.try_acquire().is_none());

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();
    for id in 0..3 {
        let gate = gate.clone();
        let order = Arc::clone(&order);
        waiters.push(tokio::spawn(async move {
            let _permit = gate.acquire().await?;
            order.lock().push(id);
            tokio::time::sleep(Duration::from_millis(5)).await;
            AiResult::Ok(())
        }));
        // Let each waiter enqueue before spawning the next
        tokio::task::yield_now().await;
    }

    assert_eq!(gate.waiting(), 3);
    assert_eq!(gate.in_use(), 2);

    drop(first);
    drop(second);
    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2]);
    assert_eq!(gate.available_permits(), 2);
}

#[tokio::test]
async fn test_permit_is_released_when_operation_fails() {
    let gate = ConcurrencyGate::new("release", 1);
    let result: AiResult<()> = gate
        .run(|| async { Err(AiError::processing_failed("boom")) })
        .await;
    assert!(result.is_err());
    assert_eq!(gate.available_permits(), 1);

    gate.close();
    assert!(gate.acquire().await.is_err());
}
