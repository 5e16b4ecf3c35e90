//! Job state enumeration and transition rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a persisted job row.
///
/// ```text
/// Pending ──claim──▶ Started ──ok──────────────▶ Finished
///    ▲                  │
///    └──retry (delay)───┤
///                       └──exhausted/unknown───▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for `available_at` to pass and a worker to claim it.
    Pending,
    /// Claimed by exactly one worker and currently executing.
    Started,
    /// Handler returned successfully.
    Finished,
    /// Attempts exhausted or job type unresolvable.
    Failed,
}

impl JobState {
    /// All states, in lifecycle order.
    pub const ALL: [JobState; 4] = [Self::Pending, Self::Started, Self::Finished, Self::Failed];

    /// Check if the job is in a terminal (absorbing) state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Started)
                | (Self::Started, Self::Finished)
                | (Self::Started, Self::Failed)
                | (Self::Started, Self::Pending)
        )
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job state '{other}'")),
        }
    }
}
