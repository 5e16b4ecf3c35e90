//! Integration tests for combined start-up and shutdown.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use taskhub::app;
use taskhub_core::config::AppConfig;
use taskhub_core::error::{AppError, ErrorKind};
use taskhub_core::result::AppResult;
use taskhub_database::{JobStore, MemoryJobStore};
use taskhub_entity::job::{Job, JobState, NewJob};
use taskhub_worker::{
    BackgroundServices, CronScheduler, Dispatcher, JobRegistry, ScheduleRegistry, WorkerPool,
};

use helpers::{CountingTask, SlowJob};

fn config(scheduler: &str) -> AppConfig {
    AppConfig::from_toml(&format!(
        "[database]\nurl = \"postgres://localhost/taskhub\"\n\
         [worker]\npoll_interval_ms = 10\n{scheduler}"
    ))
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeat_flows_from_scheduler_to_worker() {
    let store = helpers::memory_store();
    let services = app::build_services(
        &config("[scheduler]\nheartbeat_cron = \"* * * * * *\""),
        store.clone(),
        app::job_registry(),
    );
    services.start(2).await.unwrap();

    assert!(
        helpers::wait_for_count(&store, JobState::Finished, 1, Duration::from_secs(4)).await,
        "no heartbeat was processed"
    );
    services.shutdown(Duration::from_secs(2)).await.unwrap();

    let dispatched = store.all().await.len();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.all().await.len(), dispatched);
    assert!(
        store
            .all()
            .await
            .iter()
            .all(|job| job.job_type == "heartbeat")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_reports_timeout_from_either_component() {
    let store = helpers::memory_store();
    let slow = SlowJob::new(Duration::from_secs(1));
    let mut registry = JobRegistry::new();
    registry.register(slow.clone());
    let job = Dispatcher::new(store.clone())
        .dispatch(&slow, json!([]))
        .await
        .unwrap();

    let mut schedules = ScheduleRegistry::new();
    schedules.register("tick", CountingTask::every_second(Duration::ZERO));

    let pool = Arc::new(WorkerPool::new(
        store.clone(),
        Arc::new(registry),
        helpers::fast_worker_config(),
    ));
    let services = BackgroundServices::new(pool, Some(CronScheduler::new(Arc::new(schedules))));
    services.start(1).await.unwrap();

    assert!(
        helpers::wait_for_state(&store, job.id, JobState::Started, Duration::from_secs(2))
            .await
            .is_some()
    );

    let err = services
        .shutdown(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);

    assert!(
        helpers::wait_for_state(&store, job.id, JobState::Finished, Duration::from_secs(3))
            .await
            .is_some()
    );
}

/// Delegates to a memory store but reports a chosen readiness.
/// `None` makes the readiness check itself fail.
#[derive(Debug, Default)]
struct ReadinessStore {
    inner: MemoryJobStore,
    ready: Option<bool>,
}

impl ReadinessStore {
    fn missing_table() -> Self {
        Self {
            ready: Some(false),
            ..Self::default()
        }
    }

    fn unreachable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for ReadinessStore {
    async fn insert(&self, job: &NewJob) -> AppResult<Job> {
        self.inner.insert(job).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        self.inner.find_by_id(id).await
    }

    async fn find_next_due(&self, now: DateTime<Utc>) -> AppResult<Option<Job>> {
        self.inner.find_next_due(now).await
    }

    async fn claim(&self, id: Uuid, attempts_seen: i32, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.claim(id, attempts_seen, now).await
    }

    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.complete(id, now).await
    }

    async fn fail(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.fail(id, error, now).await
    }

    async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.inner.reschedule(id, error, available_at).await
    }

    async fn count_by_state(&self, state: JobState) -> AppResult<i64> {
        self.inner.count_by_state(state).await
    }

    async fn count_stalled(&self, started_before: DateTime<Utc>) -> AppResult<i64> {
        self.inner.count_stalled(started_before).await
    }

    async fn is_ready(&self) -> AppResult<bool> {
        self.ready
            .ok_or_else(|| AppError::database("connection refused"))
    }
}

#[tokio::test]
async fn test_missing_table_starts_no_workers() {
    let store = Arc::new(ReadinessStore::missing_table());
    let services = app::build_services(
        &config("[scheduler]\nenabled = false"),
        store.clone(),
        app::job_registry(),
    );

    services.start(5).await.unwrap();
    assert!(services.pool().is_started().await);
    assert_eq!(services.pool().running_workers(), 0);

    services.shutdown(Duration::from_millis(50)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_pool_start_stops_scheduler() {
    let task = CountingTask::every_second(Duration::ZERO);
    let ticks = task.ticks.clone();
    let mut schedules = ScheduleRegistry::new();
    schedules.register("tick", task);

    let pool = Arc::new(WorkerPool::new(
        Arc::new(ReadinessStore::unreachable()),
        Arc::new(JobRegistry::new()),
        helpers::fast_worker_config(),
    ));
    let services = BackgroundServices::new(pool, Some(CronScheduler::new(Arc::new(schedules))));

    let err = services.start(2).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    assert!(!services.pool().is_started().await);

    let ticks_after_start = ticks.load(std::sync::atomic::Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(
        ticks.load(std::sync::atomic::Ordering::SeqCst),
        ticks_after_start
    );
}
