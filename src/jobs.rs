//! Built-in job types and periodic tasks.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use taskhub_worker::{Dispatcher, JobHandler, ScheduledTask};

/// Registry key of [`HeartbeatJob`].
pub const HEARTBEAT_JOB: &str = "heartbeat";

/// Logs its payload. Used to verify that dispatch and workers are alive.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatJob;

#[async_trait]
impl JobHandler for HeartbeatJob {
    fn job_type(&self) -> &str {
        HEARTBEAT_JOB
    }

    async fn handle(&self, payload: &Value) -> anyhow::Result<()> {
        tracing::info!(%payload, "Heartbeat");
        Ok(())
    }

    fn max_attempts(&self) -> i32 {
        1
    }

    fn retry_after(&self) -> Duration {
        Duration::ZERO
    }
}

/// Dispatches a [`HeartbeatJob`] on every tick.
#[derive(Debug)]
pub struct HeartbeatTask {
    schedule: String,
    dispatcher: Dispatcher,
}

impl HeartbeatTask {
    pub fn new(schedule: impl Into<String>, dispatcher: Dispatcher) -> Self {
        Self {
            schedule: schedule.into(),
            dispatcher,
        }
    }
}

#[async_trait]
impl ScheduledTask for HeartbeatTask {
    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn run(&self) {
        let payload = serde_json::json!({ "sent_at": chrono::Utc::now() });
        if let Err(e) = self.dispatcher.dispatch(&HeartbeatJob, payload).await {
            tracing::error!(error = %e, "Failed to dispatch heartbeat");
        }
    }
}
