//! Execution logging.
//!
//! Every dispatch attempt appends one row; retries produce additional rows,
//! never mutations. A row is completed exactly once: completion is guarded so
//! a row the monitor already flagged as timed out is not overwritten by a
//! late-finishing handler.

mod memory;

pub use memory::InMemoryExecutionLog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{truncate_chars, ExecutionId, JobDefinition, JobId};
use crate::store::{PageRequest, PageResult};

/// Maximum stored length of a result or error text, in characters.
/// Oversized values are silently trimmed at completion time.
pub const RESULT_MAX_LEN: usize = 2000;

/// Errors from execution log operations.
#[derive(Debug, Error)]
pub enum ExecutionLogError {
    /// The requested row was not found.
    #[error("execution not found: {0}")]
    NotFound(ExecutionId),

    /// A row with the same id was already recorded.
    #[error("duplicate execution id: {0}")]
    DuplicateId(ExecutionId),

    /// Log lock was poisoned.
    #[error("log lock poisoned")]
    LockPoisoned,
}

/// State of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Attempt is in flight.
    Running,
    /// Handler returned a result.
    Success,
    /// Handler failed, or its handler name could not be resolved.
    Failure,
    /// The monitor observed the attempt exceeding its monitor timeout.
    /// The handler itself is not interrupted.
    Timeout,
}

impl ExecutionStatus {
    /// Whether no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// One execution attempt of a job.
///
/// `handler_name` and `handler_param` are snapshots taken at dispatch time;
/// editing the definition mid-run does not change them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub job_id: JobId,
    pub handler_name: String,
    pub handler_param: String,
    /// 1-based attempt number within one fire.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Result text on success, error text on failure. Truncated to
    /// [`RESULT_MAX_LEN`].
    pub result: Option<String>,
}

impl ExecutionRecord {
    /// Start a new attempt row for a definition, snapshotting its handler
    /// name and parameter.
    pub fn begin(def: &JobDefinition, attempt: u32) -> Self {
        Self {
            id: ExecutionId::new(),
            job_id: def.id,
            handler_name: def.handler_name.clone(),
            handler_param: def.param().to_string(),
            attempt,
            started_at: Utc::now(),
            ended_at: None,
            status: ExecutionStatus::Running,
            result: None,
        }
    }
}

/// Terminal outcome applied to a running row.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub result: Option<String>,
}

impl ExecutionOutcome {
    /// Successful completion with the handler's result text.
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            result: Some(truncate_chars(&result.into(), RESULT_MAX_LEN)),
        }
    }

    /// Failed completion with an error text.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failure,
            result: Some(truncate_chars(&error.into(), RESULT_MAX_LEN)),
        }
    }

    /// Timeout observed by the monitor.
    pub fn timeout(elapsed: std::time::Duration) -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            result: Some(format!("execution overran monitor timeout after {:?}", elapsed)),
        }
    }
}

/// Time-range filter for log queries (half-open: `from <= t < to`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Whether an instant falls inside the range.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if t < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if t >= to {
                return false;
            }
        }
        true
    }
}

/// Append-only execution log.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    /// Append an attempt row.
    async fn record(&self, row: ExecutionRecord) -> Result<(), ExecutionLogError>;

    /// Complete a row, exactly once.
    ///
    /// Returns `true` if the outcome was applied, `false` if the row had
    /// already reached a terminal state (late completion is dropped).
    async fn complete(
        &self,
        id: ExecutionId,
        outcome: ExecutionOutcome,
    ) -> Result<bool, ExecutionLogError>;

    /// Get a row by id.
    async fn get(&self, id: ExecutionId) -> Result<ExecutionRecord, ExecutionLogError>;

    /// All rows for one job, in append (fire) order.
    async fn list_for_job(&self, job_id: JobId) -> Result<Vec<ExecutionRecord>, ExecutionLogError>;

    /// Paged read filtered by job id and/or start-time range, in append order.
    async fn query(
        &self,
        job_id: Option<JobId>,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<PageResult<ExecutionRecord>, ExecutionLogError>;
}
