//! Background worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Background job worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker pool is started by the server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent workers polling the job table.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Idle wait between polls when no job is due, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound on how long shutdown waits for in-flight jobs.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// Age after which a `started` row is reported as stalled.
    #[serde(default = "default_stalled_after")]
    pub stalled_after_seconds: u64,
}

impl WorkerConfig {
    /// Reject a zero poll interval, which would make idle workers spin.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.poll_interval_ms == 0 {
            return Err(AppError::configuration(
                "worker.poll_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Shutdown deadline as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Stalled threshold as a [`Duration`].
    pub fn stalled_after(&self) -> Duration {
        Duration::from_secs(self.stalled_after_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            stalled_after_seconds: default_stalled_after(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    5
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_stalled_after() -> u64 {
    3600
}
