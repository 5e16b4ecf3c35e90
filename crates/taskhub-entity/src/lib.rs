//! # taskhub-entity
//!
//! Domain entity models for TaskHub. The `Job` struct represents one row
//! of the persistent `jobs` table; `JobState` encodes its lifecycle.

pub mod job;
