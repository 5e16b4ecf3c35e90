//! # taskhub-core
//!
//! Core crate for TaskHub. Contains the configuration schemas and the
//! unified error system shared by the store, worker, and binaries.
//!
//! This crate has **no** internal dependencies on other TaskHub crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
