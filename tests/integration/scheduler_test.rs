//! Integration tests for the cron scheduler.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::sleep;

use taskhub_core::error::ErrorKind;
use taskhub_worker::{CronScheduler, ScheduleRegistry};

use helpers::CountingTask;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_runs_on_schedule() {
    let task = CountingTask::every_second(Duration::ZERO);
    let ticks = task.ticks.clone();
    let mut registry = ScheduleRegistry::new();
    registry.register("tick", task);

    let scheduler = CronScheduler::new(Arc::new(registry));
    scheduler.start().await.unwrap();
    assert!(scheduler.is_started().await);

    sleep(Duration::from_millis(3200)).await;
    scheduler.shutdown(Duration::from_secs(1)).await.unwrap();

    assert!(ticks.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_twice_registers_once() {
    let task = CountingTask::every_second(Duration::ZERO);
    let ticks = task.ticks.clone();
    let mut registry = ScheduleRegistry::new();
    registry.register("tick", task);

    let scheduler = CronScheduler::new(Arc::new(registry));
    scheduler.start().await.unwrap();
    scheduler.start().await.unwrap();

    sleep(Duration::from_millis(2500)).await;
    scheduler.shutdown(Duration::from_secs(1)).await.unwrap();

    let count = ticks.load(Ordering::SeqCst);
    assert!((1..=3).contains(&count), "unexpected tick count {count}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_timeout_lets_running_task_finish() {
    let task = CountingTask::every_second(Duration::from_millis(1500));
    let ticks = task.ticks.clone();
    let finished = task.finished.clone();
    let mut registry = ScheduleRegistry::new();
    registry.register("slow", task);

    let scheduler = CronScheduler::new(Arc::new(registry));
    scheduler.start().await.unwrap();

    while ticks.load(Ordering::SeqCst) == 0 {
        sleep(Duration::from_millis(10)).await;
    }

    let err = scheduler
        .shutdown(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);

    // No new ticks once stopped; the running body completes on its own.
    let ticks_at_stop = ticks.load(Ordering::SeqCst);
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), ticks_at_stop);
    assert_eq!(finished.load(Ordering::SeqCst), ticks_at_stop);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_is_idempotent() {
    let mut registry = ScheduleRegistry::new();
    registry.register("tick", CountingTask::every_second(Duration::ZERO));

    let scheduler = CronScheduler::new(Arc::new(registry));
    scheduler.start().await.unwrap();
    scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
    scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_deadline_still_stops_idle_clock() {
    let mut task = CountingTask::every_second(Duration::ZERO);
    task.schedule = "0 0 0 1 1 *";
    let ticks = task.ticks.clone();
    let mut registry = ScheduleRegistry::new();
    registry.register("yearly", task);

    let scheduler = CronScheduler::new(Arc::new(registry));
    scheduler.start().await.unwrap();

    // No task body is running.
    scheduler.shutdown(Duration::ZERO).await.unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}
