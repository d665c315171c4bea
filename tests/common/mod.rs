//! Common test utilities shared across integration tests.

use std::time::Duration;

use belfry::{ExecutionLog, ExecutionRecord, JobId};

/// Wait until a job has at least `at_least` log rows, polling the log.
///
/// More reliable than fixed sleeps since execution time can vary. Polls
/// every 10ms and panics when the timeout is reached first.
pub async fn wait_for_rows(
    log: &dyn ExecutionLog,
    job_id: JobId,
    at_least: usize,
    timeout: Duration,
) -> Vec<ExecutionRecord> {
    let start = tokio::time::Instant::now();
    loop {
        let rows = log.list_for_job(job_id).await.unwrap();
        if rows.len() >= at_least {
            return rows;
        }
        if start.elapsed() > timeout {
            panic!(
                "timeout waiting for {} row(s) for job {}, have {}",
                at_least,
                job_id,
                rows.len()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until a job has exactly `expected` rows, all terminal.
///
/// Counting the rows matters: between retry attempts every existing row is
/// momentarily terminal, so "all rows terminal" alone would return too early.
pub async fn wait_for_terminal_rows(
    log: &dyn ExecutionLog,
    job_id: JobId,
    expected: usize,
    timeout: Duration,
) -> Vec<ExecutionRecord> {
    let start = tokio::time::Instant::now();
    loop {
        let rows = log.list_for_job(job_id).await.unwrap();
        if rows.len() >= expected && rows.iter().all(|r| r.status.is_terminal()) {
            return rows;
        }
        if start.elapsed() > timeout {
            panic!(
                "timeout waiting for {} terminal row(s) for job {}, have {}",
                expected,
                job_id,
                rows.len()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
