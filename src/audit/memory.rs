use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::{AccessLogRecord, LogRecord, OperateLogRecord};
use crate::reclaim::ReclaimableStore;
use crate::store::{PageRequest, PageResult};

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("audit log lock poisoned")]
    LockPoisoned,
}

/// Append-only in-memory log table, generic over the record type.
///
/// Rows are held in append order, which for records stamped at creation is
/// also creation-time order. `delete_older_than` does not rely on that: it
/// scans the whole table, so backfilled rows are reclaimed correctly too.
pub struct InMemoryLogStore<T> {
    rows: RwLock<Vec<T>>,
}

pub type InMemoryAccessLogStore = InMemoryLogStore<AccessLogRecord>;
pub type InMemoryOperateLogStore = InMemoryLogStore<OperateLogRecord>;

impl<T: LogRecord + Clone> InMemoryLogStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&self, record: T) -> Result<(), AuditLogError> {
        let mut rows = self.rows.write().map_err(|_| AuditLogError::LockPoisoned)?;
        rows.push(record);
        Ok(())
    }

    /// Page through rows in append order.
    pub fn page(&self, page: PageRequest) -> Result<PageResult<T>, AuditLogError> {
        let rows = self.rows.read().map_err(|_| AuditLogError::LockPoisoned)?;
        let total = rows.len();
        let items = rows
            .iter()
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect();
        Ok(PageResult { items, total })
    }

    /// Rows with `create_time` in `[from, to)`.
    pub fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<T>, AuditLogError> {
        let rows = self.rows.read().map_err(|_| AuditLogError::LockPoisoned)?;
        Ok(rows
            .iter()
            .filter(|r| r.create_time() >= from && r.create_time() < to)
            .cloned()
            .collect())
    }
}

impl<T: LogRecord + Clone> Default for InMemoryLogStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: LogRecord + Clone> ReclaimableStore for InMemoryLogStore<T> {
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let mut rows = self.rows.write().map_err(|_| AuditLogError::LockPoisoned)?;
        let mut deleted = 0usize;
        rows.retain(|r| {
            if deleted < limit && r.create_time() < cutoff {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }
}
