//! Maps job type names to handler factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing;

use taskhub_core::error::AppError;
use taskhub_core::result::AppResult;

use crate::handler::JobHandler;

/// Constructor producing a fresh handler for one execution.
pub type JobFactory = Arc<dyn Fn() -> Box<dyn JobHandler> + Send + Sync>;

/// Maps job type names to handler factories.
///
/// Populated mutably during start-up, then shared behind an `Arc` so
/// workers only ever read it.
#[derive(Default, Clone)]
pub struct JobRegistry {
    factories: HashMap<String, JobFactory>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler prototype under its own job type.
    ///
    /// Each resolution clones the prototype. A later registration for the
    /// same type replaces the earlier one.
    pub fn register<H>(&mut self, handler: H)
    where
        H: JobHandler + Clone + 'static,
    {
        let job_type = handler.job_type().to_string();
        self.register_factory(job_type, move || Box::new(handler.clone()));
    }

    /// Register an explicit constructor for `job_type`.
    pub fn register_factory<F>(&mut self, job_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn JobHandler> + Send + Sync + 'static,
    {
        let job_type = job_type.into();
        if self
            .factories
            .insert(job_type.clone(), Arc::new(factory))
            .is_some()
        {
            tracing::warn!(job_type = %job_type, "Replaced existing job handler registration");
        } else {
            tracing::info!(job_type = %job_type, "Registered job handler");
        }
    }

    /// Build a fresh handler for `job_type`.
    pub fn resolve(&self, job_type: &str) -> AppResult<Box<dyn JobHandler>> {
        self.factories
            .get(job_type)
            .map(|factory| factory())
            .ok_or_else(|| AppError::not_found(format!("job type '{job_type}' not registered")))
    }

    /// Check if a handler is registered for a job type.
    pub fn contains(&self, job_type: &str) -> bool {
        self.factories.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
