//! Retry budgets and overrun monitoring observed through the execution log.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use belfry::core::{HandlerError, JobDefinition, JobHandler, RetryPolicy};
use belfry::logger::ExecutionStatus;
use belfry::scheduler::{HandlerExecutor, Scheduler};
use belfry::{
    ExecutionLog, HandlerRegistry, InMemoryExecutionLog, InMemoryJobStore, JobId, JobStore,
};

use crate::common::{wait_for_rows, wait_for_terminal_rows};

struct AlwaysFails;

#[async_trait]
impl JobHandler for AlwaysFails {
    async fn execute(&self, _param: &str) -> Result<String, HandlerError> {
        Err(HandlerError::ExecutionFailed("downstream unavailable".into()))
    }
}

/// Fails until the configured number of calls, then succeeds.
struct FlakyUntil {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl JobHandler for FlakyUntil {
    async fn execute(&self, _param: &str) -> Result<String, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(HandlerError::ExecutionFailed(format!("attempt {call} failed")))
        } else {
            Ok(format!("recovered on attempt {call}"))
        }
    }
}

struct Slow(Duration);

#[async_trait]
impl JobHandler for Slow {
    async fn execute(&self, _param: &str) -> Result<String, HandlerError> {
        tokio::time::sleep(self.0).await;
        Ok("done".to_string())
    }
}

/// Sleeps past the monitor timeout, then fails.
struct SlowThenFails(Duration);

#[async_trait]
impl JobHandler for SlowThenFails {
    async fn execute(&self, _param: &str) -> Result<String, HandlerError> {
        tokio::time::sleep(self.0).await;
        Err(HandlerError::ExecutionFailed("gave up late".into()))
    }
}

async fn start_with(
    handler_name: &str,
    handler: Arc<dyn JobHandler>,
    def: JobDefinition,
) -> (
    Arc<InMemoryExecutionLog>,
    belfry::SchedulerHandle,
    tokio::task::JoinHandle<()>,
) {
    let registry = HandlerRegistry::builder()
        .register(handler_name, handler)
        .unwrap()
        .build();
    let store = Arc::new(InMemoryJobStore::new());
    let log = Arc::new(InMemoryExecutionLog::new());
    store.insert(def).await.unwrap();
    let executor = Arc::new(HandlerExecutor::new(Arc::new(registry), log.clone()));
    let scheduler = Scheduler::new(store, executor, log.clone())
        .with_tick_interval(Duration::from_millis(20));
    let (handle, task) = scheduler.start();
    (log, handle, task)
}

#[tokio::test]
async fn retry_count_two_yields_exactly_three_failure_rows() {
    let def = JobDefinition::new(1, "doomed", "doomed", "0 0 0 1 1 *")
        .with_retry(RetryPolicy::fixed(2, Duration::from_millis(10)));
    let (log, handle, task) = start_with("doomed", Arc::new(AlwaysFails), def).await;

    handle.trigger(1).await.unwrap();
    let rows = wait_for_terminal_rows(log.as_ref(), JobId::new(1), 3, Duration::from_secs(5)).await;

    assert_eq!(rows.len(), 3);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.attempt, (i + 1) as u32);
        assert_eq!(row.status, ExecutionStatus::Failure);
        assert!(row
            .result
            .as_deref()
            .is_some_and(|r| r.contains("downstream unavailable")));
    }

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn flaky_handler_recovers_within_retry_budget() {
    let flaky = Arc::new(FlakyUntil {
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let def = JobDefinition::new(2, "flaky", "flaky", "0 0 0 1 1 *")
        .with_retry(RetryPolicy::fixed(3, Duration::from_millis(10)));
    let (log, handle, task) = start_with("flaky", flaky, def).await;

    handle.trigger(2).await.unwrap();
    let rows = wait_for_terminal_rows(log.as_ref(), JobId::new(2), 3, Duration::from_secs(5)).await;

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].status, ExecutionStatus::Failure);
    assert_eq!(rows[1].status, ExecutionStatus::Failure);
    assert_eq!(rows[2].status, ExecutionStatus::Success);
    assert_eq!(rows[2].result.as_deref(), Some("recovered on attempt 3"));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn unregistered_handler_fails_terminally_without_retries() {
    let def = JobDefinition::new(3, "orphan", "no-such-handler", "0 0 0 1 1 *")
        .with_retry(RetryPolicy::fixed(5, Duration::from_millis(10)));
    let (log, handle, task) = start_with("other", Arc::new(AlwaysFails), def).await;

    handle.trigger(3).await.unwrap();
    let rows = wait_for_terminal_rows(log.as_ref(), JobId::new(3), 1, Duration::from_secs(5)).await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ExecutionStatus::Failure);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn overrun_execution_is_flagged_timeout() {
    let def = JobDefinition::new(4, "sluggish", "sluggish", "0 0 0 1 1 *")
        .with_monitor_timeout(Duration::from_millis(50));
    let (log, handle, task) = start_with(
        "sluggish",
        Arc::new(Slow(Duration::from_millis(400))),
        def,
    )
    .await;

    handle.trigger(4).await.unwrap();
    let rows = wait_for_rows(log.as_ref(), JobId::new(4), 1, Duration::from_secs(5)).await;
    assert_eq!(rows[0].status, ExecutionStatus::Running);

    // The monitor sweep flags the overrun row, then the late handler
    // completion is discarded by the guarded complete.
    let rows = wait_for_terminal_rows(log.as_ref(), JobId::new(4), 1, Duration::from_secs(5)).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ExecutionStatus::Timeout);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let rows = log.list_for_job(JobId::new(4)).await.unwrap();
    assert_eq!(rows[0].status, ExecutionStatus::Timeout);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn timeout_terminal_state_suppresses_remaining_retries() {
    let def = JobDefinition::new(5, "sluggish", "sluggish", "0 0 0 1 1 *")
        .with_monitor_timeout(Duration::from_millis(50))
        .with_retry(RetryPolicy::fixed(2, Duration::from_millis(10)));
    let (log, handle, task) = start_with(
        "sluggish",
        Arc::new(SlowThenFails(Duration::from_millis(200))),
        def,
    )
    .await;

    handle.trigger(5).await.unwrap();
    let rows = wait_for_terminal_rows(log.as_ref(), JobId::new(5), 1, Duration::from_secs(5)).await;
    assert_eq!(rows[0].status, ExecutionStatus::Timeout);

    // Leave time for the attempts the retry budget would otherwise allow;
    // a terminal Timeout must end the fire with the single flagged row.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let rows = log.list_for_job(JobId::new(5)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ExecutionStatus::Timeout);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
