//! Job definition storage.
//!
//! Trait-based abstraction over the external store holding job definitions,
//! with an in-memory backend for development and tests. The scheduler only
//! ever reads; writes come from the management surface.

mod memory;

pub use memory::InMemoryJobStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{JobDefinition, JobId, JobStatus};

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// The requested definition was not found.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// A definition with the same id already exists.
    #[error("duplicate job id: {0}")]
    DuplicateId(JobId),

    /// Another enabled definition already uses this handler name.
    ///
    /// The registry resolves one handler per name; ambiguity is a
    /// configuration error surfaced here, not at dispatch time.
    #[error("handler name already bound to an enabled job: {0}")]
    DuplicateHandlerName(String),

    /// Store lock was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Generic store error.
    #[error("store error: {0}")]
    Other(String),
}

/// Pagination request: 1-based page number and page size.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    /// First page with the given size.
    pub fn first(size: usize) -> Self {
        Self { page: 1, size }
    }

    /// Offset of the first item on this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.size
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Filter for paged definition queries. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    /// Substring match on the job name.
    pub name_contains: Option<String>,
    /// Substring match on the handler name.
    pub handler_contains: Option<String>,
    /// Exact status match.
    pub status: Option<JobStatus>,
}

impl JobQuery {
    /// Whether a definition matches this filter.
    pub fn matches(&self, def: &JobDefinition) -> bool {
        if let Some(name) = &self.name_contains {
            if !def.name.contains(name.as_str()) {
                return false;
            }
        }
        if let Some(handler) = &self.handler_contains {
            if !def.handler_name.contains(handler.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if def.status != status {
                return false;
            }
        }
        true
    }
}

/// Storage for job definitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new definition.
    ///
    /// Fails with [`JobStoreError::DuplicateHandlerName`] if the definition is
    /// enabled and another enabled definition already uses its handler name.
    async fn insert(&self, def: JobDefinition) -> Result<(), JobStoreError>;

    /// Replace an existing definition, subject to the same uniqueness check.
    async fn update(&self, def: JobDefinition) -> Result<(), JobStoreError>;

    /// Get a definition by id.
    async fn get(&self, id: JobId) -> Result<JobDefinition, JobStoreError>;

    /// Delete a definition by id.
    async fn delete(&self, id: JobId) -> Result<(), JobStoreError>;

    /// List all enabled definitions, ordered by id.
    ///
    /// This is the scheduler's per-tick read.
    async fn list_enabled(&self) -> Result<Vec<JobDefinition>, JobStoreError>;

    /// Paged, filtered query over all definitions, ordered by id descending.
    async fn query(
        &self,
        filter: &JobQuery,
        page: PageRequest,
    ) -> Result<PageResult<JobDefinition>, JobStoreError>;
}
