//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use taskhub_core::config::WorkerConfig;
use taskhub_database::{JobStore, MemoryJobStore};
use taskhub_entity::job::{Job, JobState};
use taskhub_worker::{JobHandler, ScheduledTask};

/// Worker settings with a short poll interval.
pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval_ms: 10,
        ..WorkerConfig::default()
    }
}

pub fn memory_store() -> Arc<MemoryJobStore> {
    Arc::new(MemoryJobStore::new())
}

/// Poll `store` until `count` rows are in `state`, or `timeout` passes.
pub async fn wait_for_count(
    store: &MemoryJobStore,
    state: JobState,
    count: i64,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if store.count_by_state(state).await.unwrap() >= count {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Poll until the row `id` reaches `state`, returning it.
pub async fn wait_for_state(
    store: &MemoryJobStore,
    id: Uuid,
    state: JobState,
    timeout: Duration,
) -> Option<Job> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(job) = store.find_by_id(id).await.unwrap() {
            if job.state == state {
                return Some(job);
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    None
}

/// Records how many times each payload `"n"` value was handled.
#[derive(Clone, Default)]
pub struct CountingJob {
    pub runs: Arc<Mutex<HashMap<u64, usize>>>,
}

#[async_trait]
impl JobHandler for CountingJob {
    fn job_type(&self) -> &str {
        "counting"
    }

    async fn handle(&self, payload: &Value) -> anyhow::Result<()> {
        let n = payload["n"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("missing n"))?;
        tokio::task::yield_now().await;
        *self.runs.lock().unwrap().entry(n).or_default() += 1;
        Ok(())
    }

    fn max_attempts(&self) -> i32 {
        3
    }

    fn retry_after(&self) -> Duration {
        Duration::from_secs(120)
    }
}

/// Sleeps for `duration` before succeeding.
#[derive(Clone)]
pub struct SlowJob {
    pub duration: Duration,
    pub started: Arc<AtomicBool>,
}

impl SlowJob {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl JobHandler for SlowJob {
    fn job_type(&self) -> &str {
        "slow"
    }

    async fn handle(&self, _payload: &Value) -> anyhow::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        sleep(self.duration).await;
        Ok(())
    }

    fn max_attempts(&self) -> i32 {
        1
    }

    fn retry_after(&self) -> Duration {
        Duration::ZERO
    }
}

/// Counts ticks and optionally sleeps inside each one.
pub struct CountingTask {
    pub schedule: &'static str,
    pub ticks: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
    pub work: Duration,
}

impl CountingTask {
    pub fn every_second(work: Duration) -> Self {
        Self {
            schedule: "* * * * * *",
            ticks: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
            work,
        }
    }
}

#[async_trait]
impl ScheduledTask for CountingTask {
    fn schedule(&self) -> &str {
        self.schedule
    }

    async fn run(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if !self.work.is_zero() {
            sleep(self.work).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}
