//! Job definition: the durable record describing one scheduled job.
//!
//! Definitions are owned by an external management surface and read-only from
//! the scheduler's perspective within a trigger cycle.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::RetryPolicy;
use super::schedule::{Schedule, ScheduleError};
use super::types::JobId;

/// Default time after which a still-running execution is flagged as overrun.
pub const DEFAULT_MONITOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether the trigger engine considers a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Considered on every poll.
    Enabled,
    /// Skipped on the next poll; an in-flight execution is not interrupted.
    Disabled,
}

/// A scheduled job: handler name, parameter, cron expression and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Unique, immutable identity.
    pub id: JobId,
    /// Human-readable label.
    pub name: String,
    /// Registry key resolving to exactly one handler.
    ///
    /// Must be unique across enabled definitions; the job store enforces
    /// this at insert/update time.
    pub handler_name: String,
    /// Opaque parameter passed to the handler on each fire.
    pub handler_param: Option<String>,
    /// Schedule descriptor (cron, shortcut or @every interval).
    pub cron_expression: String,
    /// Timezone the cron expression is evaluated in.
    pub timezone: String,
    /// Enabled/disabled state.
    pub status: JobStatus,
    /// Retry policy for handler failures.
    pub retry: RetryPolicy,
    /// Elapsed time after which a running execution is flagged as overrun.
    pub monitor_timeout: Duration,
}

impl JobDefinition {
    /// Create an enabled definition with default policies.
    pub fn new(
        id: impl Into<JobId>,
        name: impl Into<String>,
        handler_name: impl Into<String>,
        cron_expression: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            handler_name: handler_name.into(),
            handler_param: None,
            cron_expression: cron_expression.into(),
            timezone: "UTC".to_string(),
            status: JobStatus::Enabled,
            retry: RetryPolicy::none(),
            monitor_timeout: DEFAULT_MONITOR_TIMEOUT,
        }
    }

    /// Set the handler parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.handler_param = Some(param.into());
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the monitor timeout.
    pub fn with_monitor_timeout(mut self, timeout: Duration) -> Self {
        self.monitor_timeout = timeout;
        self
    }

    /// Set the timezone the cron expression is evaluated in.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Whether the trigger engine should consider this definition.
    pub fn is_enabled(&self) -> bool {
        self.status == JobStatus::Enabled
    }

    /// Parse this definition's schedule.
    ///
    /// Parsing is cheap; the engine re-parses per tick rather than caching a
    /// parsed schedule that could drift from an edited expression.
    pub fn schedule(&self) -> Result<Schedule, ScheduleError> {
        Schedule::parse_in_timezone(&self.cron_expression, &self.timezone)
    }

    /// The parameter passed to the handler, defaulting to the empty string.
    pub fn param(&self) -> &str {
        self.handler_param.as_deref().unwrap_or("")
    }
}
