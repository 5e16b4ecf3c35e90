//! Background job processing and scheduled tasks for TaskHub.
//!
//! This crate provides:
//! - A job handler contract and a registry mapping job types to handlers
//! - A dispatcher that persists job invocations as pending rows
//! - A worker pool that claims, executes, retries, and finalizes jobs
//! - A cron scheduler that runs registered periodic tasks
//! - A lifecycle controller that starts and cooperatively stops both

pub mod dispatcher;
pub mod handler;
pub mod lifecycle;
pub mod registry;
pub mod runner;
pub mod scheduler;

pub use dispatcher::Dispatcher;
pub use handler::JobHandler;
pub use lifecycle::BackgroundServices;
pub use registry::JobRegistry;
pub use runner::{JobOutcome, Step, Worker, WorkerPool};
pub use scheduler::{CronScheduler, ScheduleRegistry, ScheduledTask};
