//! Cron scheduler for periodic tasks.
//!
//! Tasks are registered by name in a [`ScheduleRegistry`] during start-up.
//! [`CronScheduler::start`] turns every entry into a cron job on a single
//! background clock. Shutdown stops the clock, then waits (bounded) for any
//! task body that is already running; running bodies are never cancelled.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tokio_util::task::TaskTracker;

use taskhub_core::error::AppError;
use taskhub_core::result::AppResult;

/// A periodic task supplied by the application.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Cron expression with a leading seconds field, e.g. `"0 */15 * * * *"`.
    fn schedule(&self) -> &str;

    /// Body invoked on every tick.
    async fn run(&self);
}

/// Named periodic tasks, populated at start-up.
#[derive(Default, Clone)]
pub struct ScheduleRegistry {
    tasks: BTreeMap<String, Arc<dyn ScheduledTask>>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `name`. A later registration replaces an
    /// earlier one with the same name.
    pub fn register<T>(&mut self, name: impl Into<String>, task: T)
    where
        T: ScheduledTask + 'static,
    {
        let name = name.into();
        if self.tasks.insert(name.clone(), Arc::new(task)).is_some() {
            tracing::warn!(task = %name, "Replaced existing scheduled task");
        }
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Iterate `(name, task)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn ScheduledTask>)> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for ScheduleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

#[derive(Default)]
struct Clock {
    started: bool,
    scheduler: Option<JobScheduler>,
}

/// Cron-based scheduler for periodic background tasks.
pub struct CronScheduler {
    registry: Arc<ScheduleRegistry>,
    clock: Mutex<Clock>,
    accepting: Arc<AtomicBool>,
    tracker: TaskTracker,
}

impl fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronScheduler")
            .field("registry", &self.registry)
            .field("running_tasks", &self.tracker.len())
            .finish()
    }
}

impl CronScheduler {
    /// Create a scheduler over `registry`. Nothing ticks until `start`.
    pub fn new(registry: Arc<ScheduleRegistry>) -> Self {
        Self {
            registry,
            clock: Mutex::new(Clock::default()),
            accepting: Arc::new(AtomicBool::new(true)),
            tracker: TaskTracker::new(),
        }
    }

    /// Build cron jobs for every registered task and start the clock.
    ///
    /// Calling again after a successful start is a no-op.
    pub async fn start(&self) -> AppResult<()> {
        let mut clock = self.clock.lock().await;
        if clock.started {
            tracing::debug!("Cron scheduler already started");
            return Ok(());
        }

        let jobs = self
            .registry
            .iter()
            .map(|(name, task)| Ok((name, task, self.cron_job(name, task)?)))
            .collect::<AppResult<Vec<_>>>()?;

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::scheduler(format!("Failed to create scheduler: {}", e)))?;

        for (name, task, job) in jobs {
            scheduler.add(job).await.map_err(|e| {
                AppError::scheduler(format!("Failed to add schedule for '{}': {}", name, e))
            })?;
            tracing::info!(task = %name, schedule = %task.schedule(), "Registered scheduled task");
        }

        scheduler
            .start()
            .await
            .map_err(|e| AppError::scheduler(format!("Failed to start scheduler: {}", e)))?;

        clock.started = true;
        clock.scheduler = Some(scheduler);
        tracing::info!(tasks = self.registry.len(), "Cron scheduler started");
        Ok(())
    }

    /// Stop ticking, then wait up to `deadline` for running task bodies.
    ///
    /// The clock is always stopped before the deadline starts counting.
    pub async fn shutdown(&self, deadline: Duration) -> AppResult<()> {
        let Some(mut scheduler) = self.clock.lock().await.scheduler.take() else {
            return Ok(());
        };

        self.accepting.store(false, Ordering::SeqCst);
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!("Failed to stop cron clock cleanly: {}", e);
        }
        self.tracker.close();

        match time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("Cron scheduler shut down");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    still_running = self.tracker.len(),
                    "Scheduled tasks still running at the shutdown deadline"
                );
                Err(AppError::timeout(format!(
                    "scheduler did not stop within {deadline:?}"
                )))
            }
        }
    }

    /// Whether `start` has completed successfully.
    pub async fn is_started(&self) -> bool {
        self.clock.lock().await.started
    }

    fn cron_job(&self, name: &str, task: &Arc<dyn ScheduledTask>) -> AppResult<CronJob> {
        let task = Arc::clone(task);
        let task_name = name.to_string();
        let accepting = Arc::clone(&self.accepting);
        let tracker = self.tracker.clone();
        let schedule = task.schedule().to_string();

        CronJob::new_async(schedule.as_str(), move |_uuid, _lock| {
            let task = Arc::clone(&task);
            let name = task_name.clone();
            let accepting = Arc::clone(&accepting);
            // Taken before the flag check so shutdown either sees this
            // run in the tracker or the run sees the flag cleared.
            let token = tracker.token();
            Box::pin(async move {
                let _token = token;
                if !accepting.load(Ordering::SeqCst) {
                    tracing::trace!(task = %name, "Skipping tick during shutdown");
                    return;
                }
                tracing::debug!(task = %name, "Running scheduled task");
                task.run().await;
            })
        })
        .map_err(|e| {
            AppError::scheduler(format!(
                "Invalid schedule '{}' for task '{}': {}",
                schedule, name, e
            ))
        })
    }
}
