//! In-process job store.
//!
//! Rows live in a `HashMap` behind a tokio `RwLock`; every conditional
//! update runs under the write lock, which gives the same single-winner
//! claim guarantee the PostgreSQL `UPDATE ... WHERE state = 'pending'`
//! provides. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use taskhub_core::result::AppResult;
use taskhub_entity::job::{Job, JobState, NewJob};

use crate::store::JobStore;

/// Volatile [`JobStore`] for tests and single-process embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, oldest first.
    pub async fn all(&self) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut rows: Vec<Job> = jobs.values().cloned().collect();
        rows.sort_by_key(|j| j.created_at);
        rows
    }

    /// Move a `started` row to `next` and apply `update`. Returns rows
    /// affected.
    async fn finalize<F>(&self, id: Uuid, next: JobState, update: F) -> u64
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Started => {
                debug_assert!(job.state.can_transition_to(next));
                job.state = next;
                update(job);
                1
            }
            _ => 0,
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &NewJob) -> AppResult<Job> {
        let row = job.clone().into_job(Uuid::new_v4());
        let mut jobs = self.jobs.write().await;
        jobs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn find_next_due(&self, now: DateTime<Utc>) -> AppResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.is_due(now))
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    async fn claim(&self, id: Uuid, attempts_seen: i32, now: DateTime<Utc>) -> AppResult<u64> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Pending && job.attempts == attempts_seen => {
                debug_assert!(job.state.can_transition_to(JobState::Started));
                job.state = JobState::Started;
                job.attempts = attempts_seen + 1;
                job.started_at = Some(now);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(self
            .finalize(id, JobState::Finished, |job| {
                job.finished_at = Some(now);
            })
            .await)
    }

    async fn fail(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> AppResult<u64> {
        Ok(self
            .finalize(id, JobState::Failed, |job| {
                job.error_msg = Some(error.to_string());
                job.finished_at = Some(now);
            })
            .await)
    }

    async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        Ok(self
            .finalize(id, JobState::Pending, |job| {
                job.error_msg = Some(error.to_string());
                job.available_at = available_at;
            })
            .await)
    }

    async fn count_by_state(&self, state: JobState) -> AppResult<i64> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|j| j.state == state).count() as i64)
    }

    async fn count_stalled(&self, started_before: DateTime<Utc>) -> AppResult<i64> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| {
                j.state == JobState::Started && j.started_at.is_some_and(|t| t < started_before)
            })
            .count() as i64)
    }
}
