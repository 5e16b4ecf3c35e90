//! Job queue inspection and dispatch commands.

use std::sync::Arc;

use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use crate::output::{self, OutputFormat};
use taskhub_core::config::AppConfig;
use taskhub_core::error::{AppError, ErrorKind};
use taskhub_database::{DatabasePool, JobStore};
use taskhub_entity::job::{Job, JobState};
use taskhub_worker::Dispatcher;

/// Arguments for the list command
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Maximum number of jobs to show
    #[arg(short, long, default_value_t = 20)]
    pub limit: i64,
}

/// Arguments for the show command
#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Job id
    pub id: Uuid,
}

/// Arguments for the dispatch command
#[derive(Debug, Args)]
pub struct DispatchArgs {
    /// Registered job type
    pub job_type: String,
    /// JSON payload
    #[arg(short, long, default_value = "{}")]
    pub payload: String,
}

/// One row of `list` output.
#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    id: String,
    job_type: String,
    state: String,
    attempts: i32,
    available_at: String,
    error: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type.clone(),
            state: job.state.to_string(),
            attempts: job.attempts,
            available_at: job.available_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            error: job.error_msg.clone().unwrap_or_default(),
        }
    }
}

/// Print counts per state plus rows stuck in `started`.
pub async fn status(db: &DatabasePool, config: &AppConfig) -> Result<(), AppError> {
    let repo = db.job_repository();

    let reachable = db.health_check().await?;
    output::print_kv("database", if reachable { "reachable" } else { "unexpected reply" });

    if !repo.is_ready().await? {
        output::print_warning("Job table not found. Run `taskhub-cli migrate run` first.");
        return Ok(());
    }

    println!("Job Queue Status:");
    for state in JobState::ALL {
        let count = repo.count_by_state(state).await?;
        output::print_kv(state.as_str(), &count.to_string());
    }

    let stalled_after = chrono::Duration::from_std(config.worker.stalled_after())
        .map_err(|e| AppError::configuration(format!("Invalid stalled_after_seconds: {e}")))?;
    let stalled = repo.count_stalled(Utc::now() - stalled_after).await?;
    output::print_kv("stalled", &stalled.to_string());
    if stalled > 0 {
        output::print_warning(&format!(
            "{stalled} job(s) have been started for over {}s and will not be retried automatically",
            config.worker.stalled_after_seconds
        ));
    }

    output::print_kv("worker enabled", &config.worker.enabled.to_string());
    output::print_kv("concurrency", &config.worker.concurrency.to_string());
    Ok(())
}

/// Print the most recently created jobs.
pub async fn list(args: &ListArgs, db: &DatabasePool, format: OutputFormat) -> Result<(), AppError> {
    if args.limit <= 0 {
        return Err(AppError::validation("--limit must be positive"));
    }
    let jobs = db.job_repository().find_recent(args.limit).await?;
    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
    output::print_list(&rows, format);
    Ok(())
}

/// Print a single job.
pub async fn show(args: &ShowArgs, db: &DatabasePool, format: OutputFormat) -> Result<(), AppError> {
    let job = db
        .job_repository()
        .find_by_id(args.id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Job {} not found", args.id)))?;
    output::print_item(&job, format);
    Ok(())
}

/// Enqueue a job by type name.
pub async fn dispatch(args: &DispatchArgs, db: &DatabasePool) -> Result<(), AppError> {
    let payload: serde_json::Value = serde_json::from_str(&args.payload).map_err(|e| {
        AppError::with_source(
            ErrorKind::Validation,
            format!("Invalid JSON payload: {e}"),
            e,
        )
    })?;

    let dispatcher = Dispatcher::new(Arc::new(db.job_repository()));
    let job = dispatcher.dispatch_raw(&args.job_type, payload).await?;

    output::print_success(&format!("Job '{}' enqueued (id: {})", job.job_type, job.id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskhub_entity::job::NewJob;

    #[test]
    fn test_job_row_formats_fields() {
        let now = Utc::now();
        let mut job = NewJob::immediate("send_email", serde_json::json!(["a@b.c"]), now)
            .into_job(Uuid::nil());
        job.error_msg = Some("smtp down".to_string());

        let row = JobRow::from(&job);
        assert_eq!(row.id, Uuid::nil().to_string());
        assert_eq!(row.state, "pending");
        assert_eq!(row.attempts, 0);
        assert_eq!(row.error, "smtp down");
    }
}
