//! Start-up and cooperative shutdown of the worker pool and scheduler.

use std::sync::Arc;
use std::time::Duration;

use taskhub_core::error::AppError;
use taskhub_core::result::AppResult;

use crate::runner::WorkerPool;
use crate::scheduler::CronScheduler;

/// Bound on stopping the scheduler when pool start-up fails.
const STARTUP_ROLLBACK_DEADLINE: Duration = Duration::from_secs(5);

/// Owns the background components of a running process.
#[derive(Debug)]
pub struct BackgroundServices {
    pool: Arc<WorkerPool>,
    scheduler: Option<CronScheduler>,
}

impl BackgroundServices {
    /// Bundle a worker pool with an optional scheduler.
    pub fn new(pool: Arc<WorkerPool>, scheduler: Option<CronScheduler>) -> Self {
        Self { pool, scheduler }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn scheduler(&self) -> Option<&CronScheduler> {
        self.scheduler.as_ref()
    }

    /// Start the scheduler (if any), then `worker_count` workers.
    ///
    /// If the pool fails to start, the scheduler is stopped again before
    /// the error is returned.
    pub async fn start(&self, worker_count: usize) -> AppResult<()> {
        if let Some(scheduler) = &self.scheduler {
            scheduler.start().await?;
        }
        if let Err(e) = self.pool.start(worker_count).await {
            if let Some(scheduler) = &self.scheduler {
                if let Err(stop) = scheduler.shutdown(STARTUP_ROLLBACK_DEADLINE).await {
                    tracing::warn!(error = %stop, "Scheduler did not stop after failed start");
                }
            }
            return Err(e);
        }
        tracing::info!(
            workers = worker_count,
            scheduler = self.scheduler.is_some(),
            "Background services started"
        );
        Ok(())
    }

    /// Stop both components under one shared `deadline`.
    ///
    /// Both are asked to stop at once. Every failure is logged; the
    /// returned error is a timeout if either component timed out,
    /// otherwise the first failure.
    pub async fn shutdown(&self, deadline: Duration) -> AppResult<()> {
        tracing::info!(?deadline, "Shutting down background services");

        let scheduler_stop = async {
            match &self.scheduler {
                Some(scheduler) => scheduler.shutdown(deadline).await,
                None => Ok(()),
            }
        };
        let (pool_result, scheduler_result) =
            tokio::join!(self.pool.shutdown(deadline), scheduler_stop);

        if let Err(e) = &pool_result {
            tracing::error!(error = %e, "Worker pool shutdown failed");
        }
        if let Err(e) = &scheduler_result {
            tracing::error!(error = %e, "Scheduler shutdown failed");
        }

        let result = combine(pool_result, scheduler_result);
        if result.is_ok() {
            tracing::info!("Background services stopped");
        }
        result
    }
}

/// A timeout wins over any other failure; otherwise the first failure.
fn combine(first: AppResult<()>, second: AppResult<()>) -> AppResult<()> {
    let mut errors: Vec<AppError> = [first, second]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    if let Some(pos) = errors.iter().position(AppError::is_timeout) {
        return Err(errors.swap_remove(pos));
    }
    errors.into_iter().next().map_or(Ok(()), Err)
}
