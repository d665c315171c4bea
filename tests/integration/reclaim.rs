//! Bounded-batch log reclamation against the in-memory audit stores.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use belfry::audit::{AccessLogRecord, InMemoryAccessLogStore};
use belfry::core::JobDefinition;
use belfry::handlers::ReclaimHandler;
use belfry::logger::ExecutionStatus;
use belfry::scheduler::{HandlerExecutor, Scheduler};
use belfry::{
    reclaim, HandlerRegistry, InMemoryExecutionLog, InMemoryJobStore, JobId, JobStore,
    ReclaimableStore, RetentionPolicy,
};

use crate::common::wait_for_terminal_rows;

fn seed_access_rows(store: &InMemoryAccessLogStore, count: usize, age_days: i64) {
    let created = Utc::now() - ChronoDuration::days(age_days);
    for i in 0..count {
        let record = AccessLogRecord::new(
            Some(1),
            "GET",
            format!("/api/item/{i}"),
            "",
            0,
            "ok",
            12,
        )
        .with_create_time(created);
        store.append(record).unwrap();
    }
}

/// Records the limit passed to each delete round so chunking is observable.
struct ChunkSpy {
    inner: InMemoryAccessLogStore,
    rounds: Mutex<Vec<usize>>,
}

#[async_trait]
impl ReclaimableStore for ChunkSpy {
    async fn delete_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        self.rounds.lock().unwrap().push(limit);
        self.inner.delete_older_than(cutoff, limit).await
    }
}

#[tokio::test]
async fn reclaim_drains_backlog_in_bounded_chunks() {
    let spy = ChunkSpy {
        inner: InMemoryAccessLogStore::new(),
        rounds: Mutex::new(Vec::new()),
    };
    seed_access_rows(&spy.inner, 2500, 30);
    seed_access_rows(&spy.inner, 10, 0);

    let deleted = reclaim(&spy, Utc::now() - ChronoDuration::days(7), 1000)
        .await
        .unwrap();

    assert_eq!(deleted, 2500);
    // Two full chunks, then a short round that signals the backlog is drained.
    assert_eq!(*spy.rounds.lock().unwrap(), vec![1000, 1000, 1000]);
    assert_eq!(spy.inner.len(), 10);
}

#[tokio::test]
async fn reclaim_with_policy_keeps_recent_rows() {
    let store = InMemoryAccessLogStore::new();
    seed_access_rows(&store, 40, 90);
    seed_access_rows(&store, 5, 1);

    let policy = RetentionPolicy::new(14, 16).unwrap();
    let deleted = belfry::reclaim_with_policy(&store, policy).await.unwrap();

    assert_eq!(deleted, 40);
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn reclaim_handler_runs_as_scheduled_job() {
    let audit = Arc::new(InMemoryAccessLogStore::new());
    seed_access_rows(&audit, 120, 60);

    let handler = ReclaimHandler::new(audit.clone(), RetentionPolicy::new(14, 50).unwrap());
    let registry = HandlerRegistry::builder()
        .register("cleanAccessLog", Arc::new(handler))
        .unwrap()
        .build();

    let store = Arc::new(InMemoryJobStore::new());
    let log = Arc::new(InMemoryExecutionLog::new());
    store
        .insert(JobDefinition::new(9, "clean access log", "cleanAccessLog", "0 0 3 * * *"))
        .await
        .unwrap();

    let executor = Arc::new(HandlerExecutor::new(Arc::new(registry), log.clone()));
    let scheduler = Scheduler::new(store, executor, log.clone())
        .with_tick_interval(Duration::from_millis(20));
    let (handle, task) = scheduler.start();

    handle.trigger(9).await.unwrap();
    let rows = wait_for_terminal_rows(log.as_ref(), JobId::new(9), 1, Duration::from_secs(5)).await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ExecutionStatus::Success);
    assert_eq!(rows[0].result.as_deref(), Some("reclaimed 120 rows"));
    assert!(audit.is_empty());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
