//! Built-in job handlers.
//!
//! `UserCountHandler` is the demo payload: each fire reports the current user
//! total. `ReclaimHandler` runs a retention policy against a reclaimable log
//! store, so log cleanup is itself just a scheduled job.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{HandlerError, JobHandler};
use crate::reclaim::{reclaim_with_policy, ReclaimableStore, RetentionPolicy};

/// Registry name of the demo handler.
pub const USER_COUNT_HANDLER: &str = "demoJob";

/// Source of the current user total.
pub trait UserCount: Send + Sync {
    fn user_count(&self) -> u64;
}

/// Fixed user total, for demos and tests.
pub struct FixedUserCount(pub u64);

impl UserCount for FixedUserCount {
    fn user_count(&self) -> u64 {
        self.0
    }
}

/// Reports the current user total on each fire.
pub struct UserCountHandler {
    source: Arc<dyn UserCount>,
}

impl UserCountHandler {
    pub fn new(source: Arc<dyn UserCount>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl JobHandler for UserCountHandler {
    async fn execute(&self, _param: &str) -> Result<String, HandlerError> {
        Ok(format!("user count: {}", self.source.user_count()))
    }
}

/// Applies a retention policy to one log store on each fire.
pub struct ReclaimHandler {
    store: Arc<dyn ReclaimableStore>,
    policy: RetentionPolicy,
}

impl ReclaimHandler {
    pub fn new(store: Arc<dyn ReclaimableStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }
}

#[async_trait]
impl JobHandler for ReclaimHandler {
    async fn execute(&self, _param: &str) -> Result<String, HandlerError> {
        let deleted = reclaim_with_policy(self.store.as_ref(), self.policy)
            .await
            .map_err(|e| HandlerError::ExecutionFailed(e.to_string()))?;
        Ok(format!("reclaimed {} rows", deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AccessLogRecord, InMemoryAccessLogStore};
    use chrono::Utc;

    #[tokio::test]
    async fn test_user_count_handler_reports_total() {
        let handler = UserCountHandler::new(Arc::new(FixedUserCount(42)));
        let result = handler.execute("").await.unwrap();
        assert_eq!(result, "user count: 42");
    }

    #[tokio::test]
    async fn test_reclaim_handler_trims_old_rows() {
        let store = Arc::new(InMemoryAccessLogStore::new());
        for _ in 0..3 {
            let row = AccessLogRecord::new(None, "GET", "/", "", 0, "ok", 1)
                .with_create_time(Utc::now() - chrono::Duration::days(30));
            store.append(row).unwrap();
        }
        store
            .append(AccessLogRecord::new(None, "GET", "/", "", 0, "ok", 1))
            .unwrap();

        let policy = RetentionPolicy::new(14, 100).unwrap();
        let handler = ReclaimHandler::new(store.clone(), policy);

        let result = handler.execute("").await.unwrap();
        assert_eq!(result, "reclaimed 3 rows");
        assert_eq!(store.len(), 1);
    }
}
