//! In-memory job store.
//!
//! Thread-safe backend for development and tests. Data is not persisted
//! across restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{JobQuery, JobStore, JobStoreError, PageRequest, PageResult};
use crate::core::{JobDefinition, JobId};

/// In-memory job definition store.
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobDefinition>>,
}

impl InMemoryJobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Check handler-name uniqueness across enabled definitions, ignoring
    /// the definition with `exclude` (for updates).
    fn check_handler_unique(
        jobs: &HashMap<JobId, JobDefinition>,
        def: &JobDefinition,
        exclude: Option<JobId>,
    ) -> Result<(), JobStoreError> {
        if !def.is_enabled() {
            return Ok(());
        }
        let clash = jobs.values().any(|existing| {
            existing.is_enabled()
                && existing.handler_name == def.handler_name
                && Some(existing.id) != exclude
        });
        if clash {
            return Err(JobStoreError::DuplicateHandlerName(
                def.handler_name.clone(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, def: JobDefinition) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::LockPoisoned)?;
        if jobs.contains_key(&def.id) {
            return Err(JobStoreError::DuplicateId(def.id));
        }
        Self::check_handler_unique(&jobs, &def, None)?;
        jobs.insert(def.id, def);
        Ok(())
    }

    async fn update(&self, def: JobDefinition) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::LockPoisoned)?;
        if !jobs.contains_key(&def.id) {
            return Err(JobStoreError::NotFound(def.id));
        }
        Self::check_handler_unique(&jobs, &def, Some(def.id))?;
        jobs.insert(def.id, def);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<JobDefinition, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::LockPoisoned)?;
        jobs.get(&id)
            .cloned()
            .ok_or(JobStoreError::NotFound(id))
    }

    async fn delete(&self, id: JobId) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::LockPoisoned)?;
        jobs.remove(&id).ok_or(JobStoreError::NotFound(id))?;
        Ok(())
    }

    async fn list_enabled(&self) -> Result<Vec<JobDefinition>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::LockPoisoned)?;
        let mut result: Vec<_> = jobs.values().filter(|d| d.is_enabled()).cloned().collect();
        result.sort_by_key(|d| d.id);
        Ok(result)
    }

    async fn query(
        &self,
        filter: &JobQuery,
        page: PageRequest,
    ) -> Result<PageResult<JobDefinition>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::LockPoisoned)?;
        let mut matched: Vec<_> = jobs.values().filter(|d| filter.matches(d)).cloned().collect();
        // Most recently created first, matching the admin listing order
        matched.sort_by(|a, b| b.id.cmp(&a.id));

        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .collect();

        Ok(PageResult { items, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobStatus;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryJobStore::new();
        let def = JobDefinition::new(1, "Demo", "demoJob", "* * * * *");

        store.insert(def).await.unwrap();
        let got = store.get(JobId::new(1)).await.unwrap();

        assert_eq!(got.name, "Demo");
        assert_eq!(got.handler_name, "demoJob");
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_fails() {
        let store = InMemoryJobStore::new();
        store
            .insert(JobDefinition::new(1, "A", "a", "@hourly"))
            .await
            .unwrap();

        let result = store.insert(JobDefinition::new(1, "B", "b", "@hourly")).await;
        assert!(matches!(result, Err(JobStoreError::DuplicateId(_))));
    }

    #[tokio::test]
    async fn test_enabled_handler_name_must_be_unique() {
        let store = InMemoryJobStore::new();
        store
            .insert(JobDefinition::new(1, "A", "demoJob", "@hourly"))
            .await
            .unwrap();

        let result = store.insert(JobDefinition::new(2, "B", "demoJob", "@daily")).await;
        assert!(matches!(
            result,
            Err(JobStoreError::DuplicateHandlerName(name)) if name == "demoJob"
        ));
    }

    #[tokio::test]
    async fn test_disabled_definition_may_share_handler_name() {
        let store = InMemoryJobStore::new();
        store
            .insert(JobDefinition::new(1, "A", "demoJob", "@hourly"))
            .await
            .unwrap();

        let disabled = JobDefinition::new(2, "B", "demoJob", "@daily")
            .with_status(JobStatus::Disabled);
        store.insert(disabled).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_rechecks_uniqueness() {
        let store = InMemoryJobStore::new();
        store
            .insert(JobDefinition::new(1, "A", "a", "@hourly"))
            .await
            .unwrap();
        store
            .insert(JobDefinition::new(2, "B", "b", "@hourly"))
            .await
            .unwrap();

        // Re-pointing job 2 at handler "a" clashes with enabled job 1
        let clashing = JobDefinition::new(2, "B", "a", "@hourly");
        let result = store.update(clashing).await;
        assert!(matches!(result, Err(JobStoreError::DuplicateHandlerName(_))));

        // Updating a job against itself is fine
        let same = JobDefinition::new(1, "A renamed", "a", "@daily");
        store.update(same).await.unwrap();
        assert_eq!(store.get(JobId::new(1)).await.unwrap().name, "A renamed");
    }

    #[tokio::test]
    async fn test_update_missing_job_fails() {
        let store = InMemoryJobStore::new();
        let result = store.update(JobDefinition::new(9, "X", "x", "@hourly")).await;
        assert!(matches!(result, Err(JobStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryJobStore::new();
        store
            .insert(JobDefinition::new(1, "A", "a", "@hourly"))
            .await
            .unwrap();

        store.delete(JobId::new(1)).await.unwrap();
        assert!(store.get(JobId::new(1)).await.is_err());
        assert!(matches!(
            store.delete(JobId::new(1)).await,
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_enabled_skips_disabled() {
        let store = InMemoryJobStore::new();
        store
            .insert(JobDefinition::new(2, "B", "b", "@hourly"))
            .await
            .unwrap();
        store
            .insert(JobDefinition::new(1, "A", "a", "@hourly"))
            .await
            .unwrap();
        store
            .insert(
                JobDefinition::new(3, "C", "c", "@hourly").with_status(JobStatus::Disabled),
            )
            .await
            .unwrap();

        let enabled = store.list_enabled().await.unwrap();
        let ids: Vec<i64> = enabled.iter().map(|d| d.id.as_i64()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_paged_query_with_filters() {
        let store = InMemoryJobStore::new();
        for i in 1..=5 {
            store
                .insert(JobDefinition::new(
                    i,
                    format!("job {}", i),
                    format!("handler{}", i),
                    "@hourly",
                ))
                .await
                .unwrap();
        }

        let all = store
            .query(&JobQuery::default(), PageRequest::first(3))
            .await
            .unwrap();
        assert_eq!(all.total, 5);
        assert_eq!(all.items.len(), 3);
        // Descending by id
        assert_eq!(all.items[0].id.as_i64(), 5);

        let second = store
            .query(&JobQuery::default(), PageRequest { page: 2, size: 3 })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);

        let filtered = store
            .query(
                &JobQuery {
                    handler_contains: Some("handler3".into()),
                    ..Default::default()
                },
                PageRequest::first(10),
            )
            .await
            .unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.items[0].id.as_i64(), 3);
    }
}
