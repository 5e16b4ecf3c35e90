//! Concrete PostgreSQL repositories.

pub mod job;
