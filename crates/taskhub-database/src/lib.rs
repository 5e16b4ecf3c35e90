//! # taskhub-database
//!
//! The [`JobStore`] contract consumed by the worker pool, a PostgreSQL
//! implementation ([`JobRepository`]) and an in-process implementation
//! ([`MemoryJobStore`]), plus connection and migration management.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use migration::MigrationStatus;
pub use memory::MemoryJobStore;
pub use repositories::job::JobRepository;
pub use store::JobStore;
