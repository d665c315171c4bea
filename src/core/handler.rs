//! Job handler trait and error types.
//!
//! The `JobHandler` trait is the unit of recurring work. Implementations are
//! registered by name in the [`HandlerRegistry`](crate::registry::HandlerRegistry)
//! at startup and dispatched by the scheduler at each fire.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a handler during execution.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler's business logic failed with a diagnostic message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Generic error wrapper for failures from handler dependencies.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A named unit of recurring work.
///
/// # Example
///
/// ```ignore
/// use belfry::{JobHandler, HandlerError};
/// use async_trait::async_trait;
///
/// struct GreetingJob;
///
/// #[async_trait]
/// impl JobHandler for GreetingJob {
///     async fn execute(&self, param: &str) -> Result<String, HandlerError> {
///         Ok(format!("hello, {}", param))
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the handler with the job's opaque parameter.
    ///
    /// # Returns
    /// * `Ok(result_text)` - recorded verbatim (truncated) in the execution log
    /// * `Err(HandlerError)` - recorded as a failed attempt, retried per the
    ///   job's retry policy
    ///
    /// A handler is expected to complete within the job's monitor timeout.
    /// The scheduler never cancels an overrunning handler; it only flags the
    /// attempt's log row as timed out when it next checks.
    async fn execute(&self, param: &str) -> Result<String, HandlerError>;
}
