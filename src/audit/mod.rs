//! Access and operation audit logs.
//!
//! These are the unbounded append-only tables the reclaimer exists for: one
//! row per inbound request or admin operation, destroyed only by retention
//! jobs. Freeform payload fields are truncated to a maximum length at write
//! time (oversized values are silently trimmed, not rejected) to protect
//! storage limits.

mod memory;

pub use memory::{InMemoryAccessLogStore, InMemoryLogStore, InMemoryOperateLogStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::truncate_chars;

/// Maximum stored length of request parameters.
pub const REQUEST_PARAMS_MAX_LEN: usize = 8000;
/// Maximum stored length of a result message.
pub const RESULT_MSG_MAX_LEN: usize = 512;
/// Maximum stored length of an operation's content description.
pub const OPERATE_CONTENT_MAX_LEN: usize = 2000;

/// A record with a creation timestamp; the only thing the reclaimer inspects.
pub trait LogRecord: Send + Sync {
    fn create_time(&self) -> DateTime<Utc>;
}

/// One inbound API request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogRecord {
    pub create_time: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub method: String,
    pub path: String,
    /// Truncated to [`REQUEST_PARAMS_MAX_LEN`].
    pub request_params: String,
    pub result_code: i32,
    /// Truncated to [`RESULT_MSG_MAX_LEN`].
    pub result_msg: String,
    pub duration_ms: u64,
}

impl AccessLogRecord {
    /// Create a record, clamping oversized payload fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Option<i64>,
        method: impl Into<String>,
        path: impl Into<String>,
        request_params: &str,
        result_code: i32,
        result_msg: &str,
        duration_ms: u64,
    ) -> Self {
        Self {
            create_time: Utc::now(),
            user_id,
            method: method.into(),
            path: path.into(),
            request_params: truncate_chars(request_params, REQUEST_PARAMS_MAX_LEN),
            result_code,
            result_msg: truncate_chars(result_msg, RESULT_MSG_MAX_LEN),
            duration_ms,
        }
    }

    /// Override the creation time (tests and backfills).
    pub fn with_create_time(mut self, t: DateTime<Utc>) -> Self {
        self.create_time = t;
        self
    }
}

impl LogRecord for AccessLogRecord {
    fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }
}

/// One admin operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperateLogRecord {
    pub create_time: DateTime<Utc>,
    pub user_id: Option<i64>,
    /// Module the operation belongs to (e.g. "job").
    pub module: String,
    /// Operation name (e.g. "update job").
    pub name: String,
    /// Truncated to [`OPERATE_CONTENT_MAX_LEN`].
    pub content: String,
}

impl OperateLogRecord {
    /// Create a record, clamping the content field.
    pub fn new(
        user_id: Option<i64>,
        module: impl Into<String>,
        name: impl Into<String>,
        content: &str,
    ) -> Self {
        Self {
            create_time: Utc::now(),
            user_id,
            module: module.into(),
            name: name.into(),
            content: truncate_chars(content, OPERATE_CONTENT_MAX_LEN),
        }
    }

    /// Override the creation time (tests and backfills).
    pub fn with_create_time(mut self, t: DateTime<Utc>) -> Self {
        self.create_time = t;
        self
    }
}

impl LogRecord for OperateLogRecord {
    fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }
}
