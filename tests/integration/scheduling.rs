//! End-to-end scheduling: YAML config through to logged executions.

use std::sync::Arc;
use std::time::Duration;

use belfry::core::{JobDefinition, JobStatus};
use belfry::handlers::{FixedUserCount, UserCountHandler, USER_COUNT_HANDLER};
use belfry::logger::ExecutionStatus;
use belfry::scheduler::{HandlerExecutor, Scheduler};
use belfry::{
    AppConfig, AppContext, ExecutionLog, HandlerRegistry, InMemoryExecutionLog, InMemoryJobStore,
    JobId, JobQuery, JobStore, PageRequest,
};

use crate::common::{wait_for_rows, wait_for_terminal_rows};

fn user_count_registry() -> HandlerRegistry {
    HandlerRegistry::builder()
        .register(
            USER_COUNT_HANDLER,
            Arc::new(UserCountHandler::new(Arc::new(FixedUserCount(42)))),
        )
        .unwrap()
        .build()
}

fn fast_scheduler(
    store: Arc<InMemoryJobStore>,
    log: Arc<InMemoryExecutionLog>,
    registry: HandlerRegistry,
) -> Scheduler {
    let executor = Arc::new(HandlerExecutor::new(Arc::new(registry), log.clone()));
    Scheduler::new(store, executor, log).with_tick_interval(Duration::from_millis(20))
}

#[tokio::test]
async fn user_count_job_fires_and_logs_success() {
    let store = Arc::new(InMemoryJobStore::new());
    let log = Arc::new(InMemoryExecutionLog::new());

    store
        .insert(JobDefinition::new(1, "user-count", USER_COUNT_HANDLER, "@every 50ms"))
        .await
        .unwrap();

    let scheduler = fast_scheduler(store, log.clone(), user_count_registry());
    let (handle, task) = scheduler.start();

    wait_for_rows(log.as_ref(), JobId::new(1), 2, Duration::from_secs(5)).await;

    // Shutdown drains in-flight work, so every row is terminal afterwards.
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let rows = log.list_for_job(JobId::new(1)).await.unwrap();
    assert!(rows.len() >= 2);
    for row in &rows {
        assert_eq!(row.status, ExecutionStatus::Success);
        assert_eq!(row.result.as_deref(), Some("user count: 42"));
        assert_eq!(row.attempt, 1);
    }
}

#[tokio::test]
async fn disabled_job_never_fires() {
    let store = Arc::new(InMemoryJobStore::new());
    let log = Arc::new(InMemoryExecutionLog::new());

    store
        .insert(
            JobDefinition::new(7, "dormant", USER_COUNT_HANDLER, "@every 30ms")
                .with_status(JobStatus::Disabled),
        )
        .await
        .unwrap();

    let scheduler = fast_scheduler(store, log.clone(), user_count_registry());
    let (handle, task) = scheduler.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(log.list_for_job(JobId::new(7)).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn manual_trigger_runs_disabled_job_once() {
    let store = Arc::new(InMemoryJobStore::new());
    let log = Arc::new(InMemoryExecutionLog::new());

    store
        .insert(
            JobDefinition::new(3, "on-demand", USER_COUNT_HANDLER, "0 0 0 1 1 *")
                .with_status(JobStatus::Disabled),
        )
        .await
        .unwrap();

    let scheduler = fast_scheduler(store, log.clone(), user_count_registry());
    let (handle, task) = scheduler.start();

    handle.trigger(3).await.unwrap();
    let rows = wait_for_terminal_rows(log.as_ref(), JobId::new(3), 1, Duration::from_secs(5)).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ExecutionStatus::Success);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn pause_stops_fires_and_resume_restarts_them() {
    let store = Arc::new(InMemoryJobStore::new());
    let log = Arc::new(InMemoryExecutionLog::new());

    store
        .insert(JobDefinition::new(4, "pausable", USER_COUNT_HANDLER, "@every 40ms"))
        .await
        .unwrap();

    let scheduler = fast_scheduler(store, log.clone(), user_count_registry());
    let (handle, task) = scheduler.start();

    wait_for_rows(log.as_ref(), JobId::new(4), 1, Duration::from_secs(5)).await;
    handle.pause().await.unwrap();
    assert!(handle.is_paused().await);

    // Let in-flight work drain, then confirm no new rows appear while paused.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let frozen = log.list_for_job(JobId::new(4)).await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(log.list_for_job(JobId::new(4)).await.unwrap().len(), frozen);

    handle.resume().await.unwrap();
    wait_for_rows(log.as_ref(), JobId::new(4), frozen + 1, Duration::from_secs(5)).await;

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn context_loads_yaml_definitions_and_schedules_them() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("count.yaml"),
        r#"
id: 10
name: count users
handler: demoJob
schedule: "@every 50ms"
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("disabled.yaml"),
        r#"
id: 11
name: disabled count
handler: demoJob
schedule: "0 0 * * *"
enabled: false
"#,
    )
    .unwrap();

    let ctx = AppContext::new(AppConfig::default(), user_count_registry());
    let loaded = ctx.load_definitions(dir.path()).await.unwrap();
    assert_eq!(loaded, 2);

    let page = ctx
        .jobs()
        .query(&JobQuery::default(), PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let enabled = ctx.jobs().list_enabled().await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id, JobId::new(10));

    // Default context tick is one second, so drive the stored jobs with a
    // fast scheduler instead of ctx.start_scheduler().
    let log = ctx.executions().clone();
    let executor = Arc::new(HandlerExecutor::new(ctx.registry().clone(), log.clone()));
    let scheduler = Scheduler::new(ctx.jobs().clone(), executor, log.clone())
        .with_tick_interval(Duration::from_millis(20));
    let (handle, task) = scheduler.start();

    let rows = wait_for_rows(log.as_ref(), JobId::new(10), 1, Duration::from_secs(5)).await;
    assert_eq!(rows[0].handler_name, USER_COUNT_HANDLER);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
