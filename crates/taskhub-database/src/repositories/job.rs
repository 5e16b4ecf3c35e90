//! PostgreSQL job repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use taskhub_core::error::{AppError, ErrorKind};
use taskhub_core::result::AppResult;
use taskhub_entity::job::{Job, JobState, NewJob};

use crate::store::JobStore;

/// Repository for the `jobs` table.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List the most recently created jobs.
    pub async fn find_recent(&self, limit: i64) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list jobs", e))
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert(&self, job: &NewJob) -> AppResult<Job> {
        sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (job_type, payload, state, attempts, available_at, created_at) \
             VALUES ($1, $2, 'pending', 0, $3, $4) RETURNING *",
        )
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.available_at)
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert job", e))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    async fn find_next_due(&self, now: DateTime<Utc>) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs \
             WHERE state = 'pending' AND available_at <= $1 \
             ORDER BY created_at ASC \
             LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to select due job", e))
    }

    async fn claim(&self, id: Uuid, attempts_seen: i32, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'started', attempts = $2 + 1, started_at = $3 \
             WHERE id = $1 AND state = 'pending' AND attempts = $2",
        )
        .bind(id)
        .bind(attempts_seen)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim job", e))?;
        Ok(result.rows_affected())
    }

    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'finished', finished_at = $2 \
             WHERE id = $1 AND state = 'started'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to complete job", e))?;
        Ok(result.rows_affected())
    }

    async fn fail(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'failed', error_msg = $2, finished_at = $3 \
             WHERE id = $1 AND state = 'started'",
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark job as failed", e)
        })?;
        Ok(result.rows_affected())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'pending', error_msg = $2, available_at = $3 \
             WHERE id = $1 AND state = 'started'",
        )
        .bind(id)
        .bind(error)
        .bind(available_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to reschedule job", e))?;
        Ok(result.rows_affected())
    }

    async fn count_by_state(&self, state: JobState) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = $1")
            .bind(state)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }

    async fn count_stalled(&self, started_before: DateTime<Utc>) -> AppResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE state = 'started' AND started_at < $1",
        )
        .bind(started_before)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count stalled jobs", e)
        })
    }

    async fn is_ready(&self) -> AppResult<bool> {
        sqlx::query_scalar("SELECT to_regclass('jobs') IS NOT NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to check jobs table", e)
            })
    }
}
