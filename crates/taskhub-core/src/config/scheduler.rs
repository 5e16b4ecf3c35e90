//! Periodic scheduler configuration.

use serde::{Deserialize, Serialize};

/// Cron scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the cron scheduler is started by the server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression (with seconds) for the built-in heartbeat task.
    /// The task is not registered when unset.
    #[serde(default)]
    pub heartbeat_cron: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            heartbeat_cron: None,
        }
    }
}

fn default_true() -> bool {
    true
}
