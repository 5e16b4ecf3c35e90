//! Wiring of registries, pool, and scheduler from configuration.

use std::sync::Arc;

use taskhub_core::config::AppConfig;
use taskhub_database::JobStore;
use taskhub_worker::{
    BackgroundServices, CronScheduler, Dispatcher, JobRegistry, ScheduleRegistry, WorkerPool,
};

use crate::jobs::{HeartbeatJob, HeartbeatTask};

/// Job registry with every built-in job type.
pub fn job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register(HeartbeatJob);
    registry
}

/// Periodic tasks enabled by `config`.
pub fn schedule_registry(config: &AppConfig, dispatcher: &Dispatcher) -> ScheduleRegistry {
    let mut schedules = ScheduleRegistry::new();
    if let Some(cron) = &config.scheduler.heartbeat_cron {
        schedules.register("heartbeat", HeartbeatTask::new(cron, dispatcher.clone()));
    }
    schedules
}

/// Build the background services for `store` without starting them.
///
/// The scheduler is omitted when disabled in `config`.
pub fn build_services(
    config: &AppConfig,
    store: Arc<dyn JobStore>,
    registry: JobRegistry,
) -> BackgroundServices {
    let dispatcher = Dispatcher::new(Arc::clone(&store));
    let pool = Arc::new(WorkerPool::new(
        store,
        Arc::new(registry),
        config.worker.clone(),
    ));

    let scheduler = config.scheduler.enabled.then(|| {
        CronScheduler::new(Arc::new(schedule_registry(config, &dispatcher)))
    });

    BackgroundServices::new(pool, scheduler)
}
