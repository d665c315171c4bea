//! YAML configuration loading.
//!
//! Job definitions are loaded one-per-file from a directory and validated
//! before the scheduler ever sees them: the cron expression must parse, the
//! handler must be registered, and handler names must be unique across
//! enabled definitions.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{JobDefinition, JobStatus, RetryPolicy, Schedule};
use crate::reclaim::RetentionPolicy;
use crate::registry::HandlerRegistry;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Global configuration (belfry.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scheduler tick interval in seconds. Minimum 1.
    pub tick_interval_secs: u64,
    /// Executor concurrency limit.
    pub max_concurrency: usize,
    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,
    /// Retention policy for log reclaim runs.
    pub retention: Option<RetentionConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            max_concurrency: 8,
            shutdown_timeout_secs: 30,
            retention: None,
        }
    }
}

impl AppConfig {
    /// Load global configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse global configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_secs must be at least 1".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency cannot be zero".into(),
            ));
        }
        if let Some(retention) = &self.retention {
            retention.policy()?;
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Retention configuration for reclaim runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Age threshold in days.
    pub exceed_days: u32,
    /// Chunk size per delete round.
    pub delete_limit: usize,
}

impl RetentionConfig {
    /// Convert into a validated [`RetentionPolicy`].
    pub fn policy(&self) -> Result<RetentionPolicy, ConfigError> {
        RetentionPolicy::new(self.exceed_days, self.delete_limit)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// One job definition from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Numeric job identifier.
    pub id: i64,
    /// Human-readable name.
    pub name: String,
    /// Registry name of the handler to run.
    pub handler: String,
    /// Parameter passed to the handler on each fire.
    pub param: Option<String>,
    /// Schedule expression, plain or with timezone.
    pub schedule: ScheduleConfig,
    /// Whether the job is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Retry policy for handler failures.
    pub retry: Option<RetryConfig>,
    /// Monitor timeout in seconds.
    pub monitor_timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleConfig {
    /// Cron expression, shortcut or `@every` interval.
    Simple(String),
    /// Expression with an explicit timezone.
    Detailed {
        cron: String,
        timezone: Option<String>,
    },
}

impl ScheduleConfig {
    pub fn cron(&self) -> &str {
        match self {
            ScheduleConfig::Simple(s) => s,
            ScheduleConfig::Detailed { cron, .. } => cron,
        }
    }

    pub fn timezone(&self) -> Option<&str> {
        match self {
            ScheduleConfig::Simple(_) => None,
            ScheduleConfig::Detailed { timezone, .. } => timezone.as_deref(),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    pub retry_count: u32,
    /// Delay between attempts in seconds.
    pub retry_interval_secs: u64,
}

impl JobConfig {
    /// Load a job configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a job configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: JobConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Convert into a [`JobDefinition`], verifying the schedule parses.
    pub fn into_definition(self) -> Result<JobDefinition, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingField("name".into()));
        }
        if self.handler.is_empty() {
            return Err(ConfigError::MissingField("handler".into()));
        }

        let timezone = self.schedule.timezone().unwrap_or("UTC").to_string();
        Schedule::parse_in_timezone(self.schedule.cron(), &timezone)
            .map_err(|e| ConfigError::Invalid(format!("invalid schedule: {}", e)))?;

        let mut def = JobDefinition::new(self.id, self.name, self.handler, self.schedule.cron())
            .with_timezone(timezone);

        if let Some(param) = self.param {
            def = def.with_param(param);
        }
        if !self.enabled {
            def = def.with_status(JobStatus::Disabled);
        }
        if let Some(retry) = self.retry {
            def = def.with_retry(RetryPolicy::fixed(
                retry.retry_count,
                Duration::from_secs(retry.retry_interval_secs),
            ));
        }
        if let Some(secs) = self.monitor_timeout_secs {
            def = def.with_monitor_timeout(Duration::from_secs(secs));
        }

        Ok(def)
    }
}

/// Load all job definitions from `.yaml`/`.yml` files in a directory.
pub fn load_definitions_from_directory(
    dir: impl AsRef<Path>,
) -> Result<Vec<JobDefinition>, ConfigError> {
    let dir = dir.as_ref();
    let mut defs = Vec::new();

    if !dir.is_dir() {
        return Err(ConfigError::Invalid(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                let config = JobConfig::load(&path)?;
                defs.push(config.into_definition()?);
            }
        }
    }

    defs.sort_by_key(|d| d.id);
    Ok(defs)
}

/// Validate definitions against a registry without running anything.
///
/// Checks that every handler resolves and that handler names are unique
/// across enabled definitions. Schedules were already verified at load time.
pub fn validate_definitions(
    defs: &[JobDefinition],
    registry: &HandlerRegistry,
) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();
    let mut enabled_handlers = HashSet::new();

    for def in defs {
        if !seen_ids.insert(def.id) {
            return Err(ConfigError::Invalid(format!("duplicate job id: {}", def.id)));
        }

        if !registry.contains(&def.handler_name) {
            return Err(ConfigError::Invalid(format!(
                "job {} references unregistered handler '{}'",
                def.id, def.handler_name
            )));
        }

        if def.is_enabled() && !enabled_handlers.insert(def.handler_name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "handler '{}' bound by more than one enabled job",
                def.handler_name
            )));
        }
    }

    Ok(())
}
