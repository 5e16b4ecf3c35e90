//! The job store contract consumed by the dispatcher and worker pool.
//!
//! The store is the only coordination point between workers: every
//! ownership change goes through [`JobStore::claim`], a conditional update
//! that succeeds for at most one caller per `(id, attempts)` pair.
//! Finalize writes are guarded on `state = started` so a terminal row is
//! never rewritten.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use taskhub_core::result::AppResult;
use taskhub_entity::job::{Job, JobState, NewJob};

/// Persistent storage for job rows.
#[async_trait]
pub trait JobStore: Send + Sync + Debug + 'static {
    /// Insert a new pending row and return it with its assigned id.
    async fn insert(&self, job: &NewJob) -> AppResult<Job>;

    /// Fetch a row by id.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>>;

    /// The oldest (by `created_at`) pending row with `available_at <= now`.
    async fn find_next_due(&self, now: DateTime<Utc>) -> AppResult<Option<Job>>;

    /// Move a pending row to `started`, bumping `attempts` from
    /// `attempts_seen` to `attempts_seen + 1` and stamping `started_at`.
    ///
    /// Returns the number of rows affected: `1` when this caller won the
    /// claim, `0` when another claimant got there first.
    async fn claim(&self, id: Uuid, attempts_seen: i32, now: DateTime<Utc>) -> AppResult<u64>;

    /// `started -> finished`.
    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<u64>;

    /// `started -> failed`, recording the error.
    async fn fail(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> AppResult<u64>;

    /// `started -> pending`, recording the error and deferring eligibility.
    async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Count rows in the given state.
    async fn count_by_state(&self, state: JobState) -> AppResult<i64>;

    /// Count `started` rows claimed before `started_before`.
    async fn count_stalled(&self, started_before: DateTime<Utc>) -> AppResult<i64>;

    /// Whether the backing table exists. Workers are not started otherwise.
    async fn is_ready(&self) -> AppResult<bool> {
        Ok(true)
    }
}
