//! Worker pool: independent workers that claim, execute, and finalize jobs.
//!
//! There is no in-memory queue between workers; the [`JobStore`] is the
//! only coordination point. Each worker loops:
//!
//! 1. select the oldest due pending row
//! 2. conditionally claim it (`pending -> started`, `attempts + 1`)
//! 3. on a lost claim, start over immediately
//! 4. resolve the handler, run it, and write the outcome
//!
//! When nothing is due the worker sleeps for the poll interval or until
//! shutdown is signalled, whichever comes first. Shutdown never
//! interrupts a running handler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio::time;
use tokio_util::task::TaskTracker;
use tracing;
use uuid::Uuid;

use taskhub_core::config::WorkerConfig;
use taskhub_core::error::AppError;
use taskhub_core::result::AppResult;
use taskhub_database::store::JobStore;
use taskhub_entity::job::Job;

use crate::registry::JobRegistry;

/// Final result of one execution of a claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Handler succeeded; row is `finished`.
    Finished,
    /// Handler failed with attempts left; row is `pending` again.
    Retrying {
        /// When the row becomes eligible again.
        available_at: DateTime<Utc>,
    },
    /// Attempts exhausted or type unknown; row is `failed`.
    Failed,
}

/// What a single poll step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// No row was due.
    Idle,
    /// A due row was found but another claimant won it.
    Contended,
    /// A row was claimed and executed.
    Processed {
        /// The claimed row.
        job_id: Uuid,
        /// How the execution ended.
        outcome: JobOutcome,
    },
}

/// A single queue consumer.
#[derive(Debug, Clone)]
pub struct Worker {
    id: String,
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
}

impl Worker {
    /// Create a worker identified by `id` in logs.
    pub fn new(id: impl Into<String>, store: Arc<dyn JobStore>, registry: Arc<JobRegistry>) -> Self {
        Self {
            id: id.into(),
            store,
            registry,
        }
    }

    /// Worker identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run until `cancel` flips to `true` (or its sender is dropped).
    pub async fn run(&self, mut cancel: watch::Receiver<bool>, poll_interval: Duration) {
        tracing::info!(worker = %self.id, "Worker started");

        loop {
            if *cancel.borrow() {
                break;
            }

            match self.process_next_at(Utc::now()).await {
                Ok(Step::Processed { .. }) | Ok(Step::Contended) => continue,
                Ok(Step::Idle) => {}
                Err(e) => {
                    tracing::error!(worker = %self.id, error = %e, "Failed to poll job store");
                }
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = time::sleep(poll_interval) => {}
            }
        }

        tracing::info!(worker = %self.id, "Worker stopped");
    }

    /// Perform one select/claim/execute/finalize step at instant `now`.
    ///
    /// Selection and claim use `now`. Finalize timestamps use the later of
    /// `now` and the wall clock after the handler returns.
    pub async fn process_next_at(&self, now: DateTime<Utc>) -> AppResult<Step> {
        let Some(job) = self.store.find_next_due(now).await? else {
            return Ok(Step::Idle);
        };

        if self.store.claim(job.id, job.attempts, now).await? == 0 {
            tracing::trace!(worker = %self.id, job_id = %job.id, "Lost claim race");
            return Ok(Step::Contended);
        }

        let attempt = job.attempts + 1;
        tracing::debug!(
            worker = %self.id,
            job_id = %job.id,
            job_type = %job.job_type,
            attempt,
            "Claimed job"
        );

        let outcome = self.execute(&job, attempt, now).await;
        Ok(Step::Processed {
            job_id: job.id,
            outcome,
        })
    }

    async fn execute(&self, job: &Job, attempt: i32, now: DateTime<Utc>) -> JobOutcome {
        let resolved = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.registry.resolve(&job.job_type)
        }))
        .unwrap_or_else(|panic| {
            Err(AppError::internal(format!(
                "handler factory panicked: {}",
                panic_message(&*panic)
            )))
        });

        let handler = match resolved {
            Ok(handler) => handler,
            Err(e) => {
                tracing::error!(
                    worker = %self.id,
                    job_id = %job.id,
                    job_type = %job.job_type,
                    error = %e,
                    "Cannot build handler; failing without retry"
                );
                let written = self.store.fail(job.id, &e.message, now).await;
                self.check_write(job, "fail", written);
                return JobOutcome::Failed;
            }
        };

        let result = AssertUnwindSafe(handler.handle(&job.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "handler panicked: {}",
                    panic_message(&*panic)
                ))
            });
        let done_at = now.max(Utc::now());

        match result {
            Ok(()) => {
                let written = self.store.complete(job.id, done_at).await;
                self.check_write(job, "complete", written);
                tracing::info!(
                    worker = %self.id,
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt,
                    "Job finished"
                );
                JobOutcome::Finished
            }
            Err(err) => {
                let message = format!("{err:#}");
                let max_attempts = handler.max_attempts();

                if attempt >= max_attempts {
                    let written = self.store.fail(job.id, &message, done_at).await;
                    self.check_write(job, "fail", written);
                    tracing::error!(
                        worker = %self.id,
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempt,
                        max_attempts,
                        error = %message,
                        "Job failed permanently"
                    );
                    JobOutcome::Failed
                } else {
                    let available_at = retry_at(done_at, handler.retry_after());
                    let written = self.store.reschedule(job.id, &message, available_at).await;
                    self.check_write(job, "reschedule", written);
                    tracing::warn!(
                        worker = %self.id,
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempt,
                        max_attempts,
                        retry_at = %available_at,
                        error = %message,
                        "Job failed; retry scheduled"
                    );
                    JobOutcome::Retrying { available_at }
                }
            }
        }
    }

    /// Log a finalize write that errored or matched no `started` row.
    /// The row is left as-is either way.
    fn check_write(&self, job: &Job, op: &str, written: AppResult<u64>) {
        match written {
            Ok(1) => {}
            Ok(_) => tracing::warn!(
                worker = %self.id,
                job_id = %job.id,
                op,
                "Finalize matched no started row"
            ),
            Err(e) => tracing::error!(
                worker = %self.id,
                job_id = %job.id,
                op,
                error = %e,
                "Failed to record job outcome; row remains started"
            ),
        }
    }
}

/// `now + after`, saturating at the maximum representable instant.
pub fn retry_at(now: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A fixed-size pool of [`Worker`]s with cooperative shutdown.
#[derive(Debug)]
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    config: WorkerConfig,
    started: Mutex<bool>,
    shutdown_tx: watch::Sender<bool>,
    tracker: TaskTracker,
}

impl WorkerPool {
    /// Create a pool; no workers run until [`start`](Self::start).
    pub fn new(store: Arc<dyn JobStore>, registry: Arc<JobRegistry>, config: WorkerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            registry,
            config,
            started: Mutex::new(false),
            shutdown_tx,
            tracker: TaskTracker::new(),
        }
    }

    /// Spawn `worker_count` workers. Calling again is a no-op.
    ///
    /// If the store reports that the job table is missing, no workers are
    /// spawned and the pool is still considered started.
    pub async fn start(&self, worker_count: usize) -> AppResult<()> {
        let mut started = self.started.lock().await;
        if *started {
            tracing::debug!("Worker pool already started");
            return Ok(());
        }

        if !self.store.is_ready().await? {
            tracing::warn!("Job table not found; worker pool will not poll");
            *started = true;
            return Ok(());
        }

        self.report_stalled().await;

        let poll_interval = self.config.poll_interval();
        for n in 0..worker_count {
            let worker = Worker::new(
                format!("worker-{n}"),
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
            );
            let cancel = self.shutdown_tx.subscribe();
            self.tracker
                .spawn(async move { worker.run(cancel, poll_interval).await });
        }

        tracing::info!(
            workers = worker_count,
            poll_interval_ms = self.config.poll_interval_ms,
            job_types = ?self.registry.registered_types(),
            "Worker pool started"
        );
        *started = true;
        Ok(())
    }

    /// Stop claiming new jobs and wait up to `deadline` for running ones.
    ///
    /// On timeout the workers keep running until their current handler
    /// returns; they are never aborted.
    pub async fn shutdown(&self, deadline: Duration) -> AppResult<()> {
        if !*self.started.lock().await {
            return Ok(());
        }

        tracing::info!("Signalling workers to stop");
        self.shutdown_tx.send_replace(true);
        self.tracker.close();

        match time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("Worker pool shut down");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    still_running = self.tracker.len(),
                    "Worker pool did not stop before the deadline"
                );
                Err(AppError::timeout(format!(
                    "worker pool did not stop within {deadline:?}"
                )))
            }
        }
    }

    /// Whether `start` has been called.
    pub async fn is_started(&self) -> bool {
        *self.started.lock().await
    }

    /// Number of worker tasks that have not yet exited.
    pub fn running_workers(&self) -> usize {
        self.tracker.len()
    }

    /// Warn about rows stranded in `started`. They are not requeued.
    async fn report_stalled(&self) {
        let Some(cutoff) = chrono::Duration::from_std(self.config.stalled_after())
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return;
        };

        match self.store.count_stalled(cutoff).await {
            Ok(0) => {}
            Ok(stalled) => tracing::warn!(
                stalled,
                started_before = %cutoff,
                "Jobs stuck in started state; they will not be retried automatically"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to count stalled jobs"),
        }
    }
}
