//! Handler execution engine.
//!
//! The `HandlerExecutor` runs a single fire of a job:
//! - Resolves the handler from the registry
//! - Retries failed attempts per the job's retry policy
//! - Writes one execution log row per attempt
//! - Limits overall concurrency via semaphore

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::core::{ExecutionId, JobDefinition, JobId};
use crate::logger::{ExecutionLog, ExecutionOutcome, ExecutionRecord};
use crate::registry::HandlerRegistry;

/// Default concurrency limit when none is configured.
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Result of one fire of a job, across all attempts.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// The job that fired.
    pub job_id: JobId,
    /// Whether any attempt succeeded.
    pub success: bool,
    /// Number of attempts made (1 = first try, 2+ = retries).
    pub attempts: u32,
    /// Total duration of all attempts.
    pub duration: std::time::Duration,
    /// Error of the last attempt, if the fire failed.
    pub error: Option<String>,
}

impl ExecutionReport {
    fn success(job_id: JobId, attempts: u32, duration: std::time::Duration) -> Self {
        Self {
            job_id,
            success: true,
            attempts,
            duration,
            error: None,
        }
    }

    fn failure(
        job_id: JobId,
        attempts: u32,
        duration: std::time::Duration,
        error: String,
    ) -> Self {
        Self {
            job_id,
            success: false,
            attempts,
            duration,
            error: Some(error),
        }
    }
}

/// Executor for running job handlers with concurrency control and retries.
pub struct HandlerExecutor {
    registry: Arc<HandlerRegistry>,
    log: Arc<dyn ExecutionLog>,
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
}

impl HandlerExecutor {
    /// Create an executor with the default concurrency limit.
    pub fn new(registry: Arc<HandlerRegistry>, log: Arc<dyn ExecutionLog>) -> Self {
        Self::with_max_concurrency(registry, log, DEFAULT_MAX_CONCURRENCY)
    }

    /// Create an executor with an explicit concurrency limit.
    pub fn with_max_concurrency(
        registry: Arc<HandlerRegistry>,
        log: Arc<dyn ExecutionLog>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            log,
            max_concurrency,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Get the concurrency limit.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Get the number of available permits (slots for concurrent fires).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run one fire of `def` to completion.
    ///
    /// Every attempt gets its own log row, appended as `Running` before the
    /// handler runs and completed when it returns. A resolution failure
    /// (handler name not registered) produces a single `Failure` row with no
    /// retries, since retrying cannot fix a missing registration.
    pub async fn execute(&self, def: &JobDefinition) -> ExecutionReport {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let start = Instant::now();

        let handler = match self.registry.resolve(&def.handler_name) {
            Ok(handler) => handler,
            Err(e) => {
                let error = e.to_string();
                let id = self.begin_attempt(def, 1).await;
                self.finish_attempt(def, id, ExecutionOutcome::failure(error.as_str()))
                    .await;
                tracing::error!(job_id = %def.id, handler = %def.handler_name, "handler not registered");
                return ExecutionReport::failure(def.id, 1, start.elapsed(), error);
            }
        };

        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let execution_id = self.begin_attempt(def, attempt).await;

            match handler.execute(def.param()).await {
                Ok(result) => {
                    self.finish_attempt(def, execution_id, ExecutionOutcome::success(result))
                        .await;
                    return ExecutionReport::success(def.id, attempt, start.elapsed());
                }
                Err(err) => {
                    let error = err.to_string();
                    let applied = self
                        .finish_attempt(def, execution_id, ExecutionOutcome::failure(error.as_str()))
                        .await;

                    // A dropped completion means the overrun sweep already
                    // flagged this fire Timeout. Terminal is terminal: no
                    // further attempts.
                    if !applied {
                        tracing::warn!(
                            job_id = %def.id,
                            attempt,
                            "fire flagged as timed out, abandoning remaining retries"
                        );
                        return ExecutionReport::failure(def.id, attempt, start.elapsed(), error);
                    }

                    if def.retry.should_retry(attempt) {
                        tracing::debug!(
                            job_id = %def.id,
                            attempt,
                            error = %error,
                            "attempt failed, retrying"
                        );
                        sleep(def.retry.retry_interval).await;
                    } else {
                        return ExecutionReport::failure(def.id, attempt, start.elapsed(), error);
                    }
                }
            }
        }
    }

    /// Append the attempt's `Running` row. Log failures are warnings, never
    /// fatal: a fire must not fail because its bookkeeping did.
    async fn begin_attempt(&self, def: &JobDefinition, attempt: u32) -> Option<ExecutionId> {
        let row = ExecutionRecord::begin(def, attempt);
        let id = row.id;
        match self.log.record(row).await {
            Ok(()) => Some(id),
            Err(e) => {
                tracing::warn!(job_id = %def.id, attempt, error = %e, "failed to append execution row");
                None
            }
        }
    }

    /// Complete the attempt's row, returning whether the completion applied.
    ///
    /// The engine's overrun sweep may have flagged the row terminal in the
    /// meantime; in that case the completion is dropped, the row keeps its
    /// `Timeout` status, and this returns `false`.
    async fn finish_attempt(
        &self,
        def: &JobDefinition,
        execution_id: Option<ExecutionId>,
        outcome: ExecutionOutcome,
    ) -> bool {
        let Some(id) = execution_id else {
            return true;
        };

        match self.log.complete(id, outcome).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(
                    job_id = %def.id,
                    execution_id = %id,
                    "late completion dropped, row already terminal"
                );
                false
            }
            Err(e) => {
                tracing::warn!(job_id = %def.id, execution_id = %id, error = %e, "failed to complete execution row");
                true
            }
        }
    }
}
