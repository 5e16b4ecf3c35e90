//! Integration tests for the worker pool against the in-memory store.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use taskhub_core::error::ErrorKind;
use taskhub_database::JobStore;
use taskhub_entity::job::JobState;
use taskhub_worker::{Dispatcher, JobRegistry, WorkerPool};

use helpers::{CountingJob, SlowJob};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_job_runs_exactly_once() {
    let store = helpers::memory_store();
    let handler = CountingJob::default();
    let mut registry = JobRegistry::new();
    registry.register(handler.clone());

    let dispatcher = Dispatcher::new(store.clone());
    for n in 0..100u64 {
        dispatcher.dispatch(&handler, json!({ "n": n })).await.unwrap();
    }

    let pool = WorkerPool::new(
        store.clone(),
        Arc::new(registry),
        helpers::fast_worker_config(),
    );
    pool.start(5).await.unwrap();
    assert_eq!(pool.running_workers(), 5);

    assert!(
        helpers::wait_for_count(&store, JobState::Finished, 100, Duration::from_secs(10)).await,
        "not every job finished"
    );
    pool.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(pool.running_workers(), 0);

    let runs = handler.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 100);
    assert!(runs.values().all(|&count| count == 1));

    for job in store.all().await {
        assert_eq!(job.state, JobState::Finished);
        assert_eq!(job.attempts, 1);
        assert!(job.finished_at.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_timeout_leaves_job_running() {
    let store = helpers::memory_store();
    let slow = SlowJob::new(Duration::from_secs(2));
    let mut registry = JobRegistry::new();
    registry.register(slow.clone());

    let job = Dispatcher::new(store.clone())
        .dispatch(&slow, json!([]))
        .await
        .unwrap();

    let pool = WorkerPool::new(
        store.clone(),
        Arc::new(registry),
        helpers::fast_worker_config(),
    );
    pool.start(1).await.unwrap();

    assert!(
        helpers::wait_for_state(&store, job.id, JobState::Started, Duration::from_secs(2))
            .await
            .is_some()
    );
    assert!(slow.started.load(Ordering::SeqCst));

    let err = pool.shutdown(Duration::from_millis(200)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);

    // The in-flight handler is not cancelled and finalizes normally.
    let finished =
        helpers::wait_for_state(&store, job.id, JobState::Finished, Duration::from_secs(5))
            .await
            .expect("job should finish after the shutdown deadline");
    assert_eq!(finished.attempts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_claims_after_shutdown() {
    let store = helpers::memory_store();
    let handler = CountingJob::default();
    let mut registry = JobRegistry::new();
    registry.register(handler.clone());

    let pool = WorkerPool::new(
        store.clone(),
        Arc::new(registry),
        helpers::fast_worker_config(),
    );
    pool.start(3).await.unwrap();
    pool.shutdown(Duration::from_secs(1)).await.unwrap();

    let job = Dispatcher::new(store.clone())
        .dispatch(&handler, json!({ "n": 7 }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let row = store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(row.state, JobState::Pending);
    assert_eq!(row.attempts, 0);
    assert!(handler.runs.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unregistered_type_fails_without_retry() {
    let store = helpers::memory_store();
    let job = Dispatcher::new(store.clone())
        .dispatch_raw("resize_image", json!(["a.png", 128]))
        .await
        .unwrap();

    let pool = WorkerPool::new(
        store.clone(),
        Arc::new(JobRegistry::new()),
        helpers::fast_worker_config(),
    );
    pool.start(2).await.unwrap();

    let failed = helpers::wait_for_state(&store, job.id, JobState::Failed, Duration::from_secs(2))
        .await
        .expect("unregistered job should fail");
    pool.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(failed.attempts, 1);
    assert!(
        failed
            .error_msg
            .as_deref()
            .is_some_and(|msg| msg.contains("resize_image"))
    );
}
