//! The contract implemented by application job types.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Trait for job handler implementations.
///
/// A handler is resolved fresh from the [`JobRegistry`](crate::JobRegistry)
/// for every execution, so per-run state can live on `self`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Registry key persisted in the `job_type` column.
    fn job_type(&self) -> &str;

    /// Execute the job. Any error counts as a failed attempt.
    async fn handle(&self, payload: &Value) -> anyhow::Result<()>;

    /// Total attempts allowed, including the first.
    fn max_attempts(&self) -> i32;

    /// Delay before a failed attempt becomes eligible again.
    fn retry_after(&self) -> Duration;
}
