//! Core types: identifiers, job definitions, schedules, retry policies and
//! the handler contract.

pub mod definition;
pub mod handler;
pub mod retry;
pub mod schedule;
pub mod types;

pub use definition::{JobDefinition, JobStatus, DEFAULT_MONITOR_TIMEOUT};
pub use handler::{HandlerError, JobHandler};
pub use retry::RetryPolicy;
pub use schedule::{Schedule, ScheduleError};
pub use types::{ExecutionId, JobId};

/// Truncate a string to at most `max` characters, returning it unchanged when
/// it already fits. Oversized values are silently trimmed, not rejected.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
