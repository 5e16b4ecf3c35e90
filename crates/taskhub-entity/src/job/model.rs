//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::state::JobState;

/// A persisted background job row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Key into the job registry (e.g., `"send_email"`).
    pub job_type: String,
    /// Serialized handler arguments. Opaque to the queue.
    pub payload: serde_json::Value,
    /// Current lifecycle state.
    pub state: JobState,
    /// Number of times a worker has claimed this row.
    pub attempts: i32,
    /// Earliest time the row may be claimed. Only meaningful while pending.
    pub available_at: DateTime<Utc>,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the most recent claim happened.
    pub started_at: Option<DateTime<Utc>>,
    /// When the row reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Error text from the most recent failed attempt.
    pub error_msg: Option<String>,
}

impl Job {
    /// Whether a worker may claim this row at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.available_at <= now
    }

    /// Whether the row has reached `Finished` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Data required to insert a new job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Job type identifier.
    pub job_type: String,
    /// Serialized arguments.
    pub payload: serde_json::Value,
    /// Earliest claim time.
    pub available_at: DateTime<Utc>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

impl NewJob {
    /// A job that is due immediately at `now`.
    pub fn immediate(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            available_at: now,
            created_at: now,
        }
    }

    /// Build the pending row a store would persist for this insert.
    pub fn into_job(self, id: Uuid) -> Job {
        Job {
            id,
            job_type: self.job_type,
            payload: self.payload,
            state: JobState::Pending,
            attempts: 0,
            available_at: self.available_at,
            created_at: self.created_at,
            started_at: None,
            finished_at: None,
            error_msg: None,
        }
    }
}
