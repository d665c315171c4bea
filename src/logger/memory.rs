//! In-memory execution log.
//!
//! Rows are kept in append order in a Vec with an id index, so fire-order
//! reads need no timestamp sorting.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{
    ExecutionLog, ExecutionLogError, ExecutionOutcome, ExecutionRecord, TimeRange,
};
use crate::core::{ExecutionId, JobId};
use crate::store::{PageRequest, PageResult};

struct Inner {
    rows: Vec<ExecutionRecord>,
    index: HashMap<ExecutionId, usize>,
}

/// In-memory execution log backend.
pub struct InMemoryExecutionLog {
    inner: RwLock<Inner>,
}

impl InMemoryExecutionLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                rows: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// Total number of rows, across all jobs.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.rows.len()).unwrap_or(0)
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryExecutionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionLog for InMemoryExecutionLog {
    async fn record(&self, row: ExecutionRecord) -> Result<(), ExecutionLogError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ExecutionLogError::LockPoisoned)?;
        if inner.index.contains_key(&row.id) {
            return Err(ExecutionLogError::DuplicateId(row.id));
        }
        let pos = inner.rows.len();
        inner.index.insert(row.id, pos);
        inner.rows.push(row);
        Ok(())
    }

    async fn complete(
        &self,
        id: ExecutionId,
        outcome: ExecutionOutcome,
    ) -> Result<bool, ExecutionLogError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ExecutionLogError::LockPoisoned)?;
        let pos = *inner
            .index
            .get(&id)
            .ok_or(ExecutionLogError::NotFound(id))?;
        let row = &mut inner.rows[pos];

        if row.status.is_terminal() {
            return Ok(false);
        }
        row.status = outcome.status;
        row.result = outcome.result;
        row.ended_at = Some(Utc::now());
        Ok(true)
    }

    async fn get(&self, id: ExecutionId) -> Result<ExecutionRecord, ExecutionLogError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ExecutionLogError::LockPoisoned)?;
        let pos = *inner
            .index
            .get(&id)
            .ok_or(ExecutionLogError::NotFound(id))?;
        Ok(inner.rows[pos].clone())
    }

    async fn list_for_job(&self, job_id: JobId) -> Result<Vec<ExecutionRecord>, ExecutionLogError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ExecutionLogError::LockPoisoned)?;
        Ok(inner
            .rows
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn query(
        &self,
        job_id: Option<JobId>,
        range: TimeRange,
        page: PageRequest,
    ) -> Result<PageResult<ExecutionRecord>, ExecutionLogError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ExecutionLogError::LockPoisoned)?;
        let matched: Vec<_> = inner
            .rows
            .iter()
            .filter(|r| job_id.map_or(true, |id| r.job_id == id))
            .filter(|r| range.contains(r.started_at))
            .cloned()
            .collect();

        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .collect();

        Ok(PageResult { items, total })
    }
}
