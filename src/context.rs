//! Application context.
//!
//! Everything the running system needs is built once at startup and held
//! here: the handler registry, the job store, the execution log and the
//! audit log stores. The context is passed by reference; there is no global
//! state.

use std::sync::Arc;

use thiserror::Error;

use crate::audit::{InMemoryAccessLogStore, InMemoryOperateLogStore};
use crate::config::{load_definitions_from_directory, validate_definitions, AppConfig, ConfigError};
use crate::logger::{ExecutionLog, InMemoryExecutionLog};
use crate::reclaim::RetentionPolicy;
use crate::registry::HandlerRegistry;
use crate::scheduler::{HandlerExecutor, Scheduler, SchedulerHandle};
use crate::store::{InMemoryJobStore, JobStore, JobStoreError};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Shared application state, built once at startup.
pub struct AppContext {
    config: AppConfig,
    registry: Arc<HandlerRegistry>,
    jobs: Arc<dyn JobStore>,
    executions: Arc<dyn ExecutionLog>,
    access_log: Arc<InMemoryAccessLogStore>,
    operate_log: Arc<InMemoryOperateLogStore>,
}

impl AppContext {
    /// Create a context with in-memory backends.
    pub fn new(config: AppConfig, registry: HandlerRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            jobs: Arc::new(InMemoryJobStore::new()),
            executions: Arc::new(InMemoryExecutionLog::new()),
            access_log: Arc::new(InMemoryAccessLogStore::new()),
            operate_log: Arc::new(InMemoryOperateLogStore::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn executions(&self) -> &Arc<dyn ExecutionLog> {
        &self.executions
    }

    pub fn access_log(&self) -> &Arc<InMemoryAccessLogStore> {
        &self.access_log
    }

    pub fn operate_log(&self) -> &Arc<InMemoryOperateLogStore> {
        &self.operate_log
    }

    /// The configured retention policy, if any.
    pub fn retention_policy(&self) -> Result<Option<RetentionPolicy>, ContextError> {
        match &self.config.retention {
            Some(retention) => Ok(Some(retention.policy()?)),
            None => Ok(None),
        }
    }

    /// Load job definitions from a directory into the job store.
    ///
    /// Definitions are validated against the registry first; the store stays
    /// untouched if any of them is invalid.
    pub async fn load_definitions(&self, dir: impl AsRef<std::path::Path>) -> Result<usize, ContextError> {
        let defs = load_definitions_from_directory(dir)?;
        validate_definitions(&defs, &self.registry)?;

        let count = defs.len();
        for def in defs {
            tracing::info!(job_id = %def.id, handler = %def.handler_name, schedule = %def.cron_expression, "loaded job definition");
            self.jobs.insert(def).await?;
        }
        Ok(count)
    }

    /// Build and start the trigger engine from this context.
    pub fn start_scheduler(&self) -> (SchedulerHandle, tokio::task::JoinHandle<()>) {
        let executor = Arc::new(HandlerExecutor::with_max_concurrency(
            Arc::clone(&self.registry),
            Arc::clone(&self.executions),
            self.config.max_concurrency,
        ));

        Scheduler::new(
            Arc::clone(&self.jobs),
            executor,
            Arc::clone(&self.executions),
        )
        .with_tick_interval(self.config.tick_interval())
        .with_shutdown_timeout(self.config.shutdown_timeout())
        .start()
    }
}
