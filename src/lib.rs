//! TaskHub server composition: built-in jobs and service wiring shared by
//! the daemon binary and integration tests.

pub mod app;
pub mod jobs;
