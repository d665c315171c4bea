//! belfry - a scheduled-job execution core.
//!
//! Named, pluggable work handlers triggered on cron-like schedules, executed
//! with bounded retry and timeout semantics, with per-attempt execution
//! logging and a bounded-batch reclaimer for trimming append-only log tables.

pub mod audit;
pub mod config;
pub mod context;
pub mod core;
pub mod handlers;
pub mod logger;
pub mod reclaim;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use config::{load_definitions_from_directory, validate_definitions, AppConfig, ConfigError};
pub use context::{AppContext, ContextError};
pub use core::{
    ExecutionId, HandlerError, JobDefinition, JobHandler, JobId, JobStatus, RetryPolicy, Schedule,
    ScheduleError,
};
pub use logger::{ExecutionLog, ExecutionRecord, ExecutionStatus, InMemoryExecutionLog};
pub use reclaim::{reclaim, reclaim_with_policy, ReclaimError, ReclaimableStore, RetentionPolicy};
pub use registry::{HandlerRegistry, RegistryError};
pub use scheduler::{Scheduler, SchedulerError, SchedulerHandle, SchedulerState};
pub use store::{InMemoryJobStore, JobQuery, JobStore, JobStoreError, PageRequest, PageResult};
