//! Persists job invocations as pending rows.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing;

use taskhub_core::error::{AppError, ErrorKind};
use taskhub_core::result::AppResult;
use taskhub_database::store::JobStore;
use taskhub_entity::job::{Job, NewJob};

use crate::handler::JobHandler;

/// Enqueues jobs into the store. Does not wait for execution.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
}

impl Dispatcher {
    /// Create a dispatcher writing to `store`.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Enqueue a run of `handler`'s job type with the given arguments.
    ///
    /// `args` is serialized as the payload; pass a tuple for positional
    /// arguments (it serializes as a JSON array).
    pub async fn dispatch<H, A>(&self, handler: &H, args: A) -> AppResult<Job>
    where
        H: JobHandler + ?Sized,
        A: Serialize,
    {
        let payload = serde_json::to_value(args).map_err(|e| {
            AppError::with_source(
                ErrorKind::Serialization,
                format!(
                    "Failed to serialize arguments for job '{}': {e}",
                    handler.job_type()
                ),
                e,
            )
        })?;
        self.dispatch_raw(handler.job_type(), payload).await
    }

    /// Enqueue a job by type name with an already-serialized payload.
    pub async fn dispatch_raw(&self, job_type: &str, payload: Value) -> AppResult<Job> {
        if job_type.trim().is_empty() {
            return Err(AppError::validation("job type must not be empty"));
        }

        let job = self
            .store
            .insert(&NewJob::immediate(job_type, payload, Utc::now()))
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to save job '{job_type}' to store"),
                    e,
                )
            })?;

        tracing::debug!(job_id = %job.id, job_type = %job.job_type, "Dispatched job");
        Ok(job)
    }
}
