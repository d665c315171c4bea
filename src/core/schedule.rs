//! Cron expression parsing and fire-time calculation.
//!
//! Supports standard five-field cron, extended six-field cron (with seconds),
//! shortcuts (@daily, @hourly, ...) and interval expressions (@every 5m),
//! with timezone-aware evaluation.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing or evaluating schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The schedule has no further occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// A parsed trigger schedule for a job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// The original expression string.
    expression: String,
    /// The timezone the expression is evaluated in.
    timezone: String,
    /// Parsed representation.
    #[serde(skip)]
    kind: ScheduleKind,
}

#[derive(Debug, Clone, Default)]
enum ScheduleKind {
    /// Cron schedule.
    Cron(Box<CronSchedule>),
    /// Interval-based schedule (e.g. @every 5m).
    Interval(std::time::Duration),
    /// Not yet parsed (only after deserialization).
    #[default]
    Unparsed,
}

impl Schedule {
    /// Parse a schedule expression, evaluated in UTC.
    ///
    /// Supports:
    /// - Standard 5-field cron: `minute hour day month weekday`
    /// - Extended 6-field cron: `second minute hour day month weekday`
    /// - Shortcuts: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
    /// - Intervals: `@every 5m`, `@every 1h30m`
    pub fn parse(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::parse_in_timezone(expression, "UTC")
    }

    /// Parse a schedule expression evaluated in a specific timezone.
    pub fn parse_in_timezone(
        expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let timezone = timezone.into();

        timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.clone()))?;

        let kind = Self::parse_expression(&expression)?;

        Ok(Self {
            expression,
            timezone,
            kind,
        })
    }

    fn parse_expression(expression: &str) -> Result<ScheduleKind, ScheduleError> {
        let trimmed = expression.trim();
        if trimmed.starts_with('@') {
            Self::parse_shortcut(trimmed)
        } else {
            Self::parse_cron(trimmed)
        }
    }

    fn parse_shortcut(expression: &str) -> Result<ScheduleKind, ScheduleError> {
        match expression.to_lowercase().as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 * * *"),
            "@hourly" => Self::parse_cron("0 * * * *"),
            s if s.starts_with("@every ") => {
                let duration = parse_duration(s[7..].trim())?;
                Ok(ScheduleKind::Interval(duration))
            }
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            ))),
        }
    }

    fn parse_cron(expression: &str) -> Result<ScheduleKind, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();

        let cron_expr = match fields.len() {
            // Standard 5-field cron, prepend a seconds field
            5 => format!("0 {}", expression),
            6 => expression.to_string(),
            _ => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    fields.len()
                )));
            }
        };

        let schedule = CronSchedule::from_str(&cron_expr)
            .map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;

        Ok(ScheduleKind::Cron(Box::new(schedule)))
    }

    /// Compute the next fire time strictly after the given instant.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match &self.kind {
            ScheduleKind::Cron(schedule) => {
                let tz: Tz = self
                    .timezone
                    .parse()
                    .map_err(|_| ScheduleError::InvalidTimezone(self.timezone.clone()))?;
                let local = after.with_timezone(&tz);
                schedule
                    .after(&local)
                    .next()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or(ScheduleError::NoMoreOccurrences)
            }
            ScheduleKind::Interval(duration) => {
                let step = chrono::Duration::from_std(*duration)
                    .map_err(|_| ScheduleError::InvalidInterval(self.expression.clone()))?;
                Ok(after + step)
            }
            ScheduleKind::Unparsed => {
                Err(ScheduleError::InvalidCron("schedule not parsed".into()))
            }
        }
    }

    /// Compute the next fire time from now.
    pub fn next_fire(&self) -> Result<DateTime<Utc>, ScheduleError> {
        self.next_fire_after(Utc::now())
    }

    /// Compute the next `n` fire times after the given instant.
    ///
    /// Used by the CLI to preview a job's upcoming fires.
    pub fn upcoming_fires(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let mut fires = Vec::with_capacity(n);
        let mut current = after;
        for _ in 0..n {
            current = self.next_fire_after(current)?;
            fires.push(current);
        }
        Ok(fires)
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Get the timezone name.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

/// Parse a duration string like "5m", "1h30m", "30s".
fn parse_duration(s: &str) -> Result<std::time::Duration, ScheduleError> {
    let mut total_ms: u64 = 0;
    let mut current_num = String::new();

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current_num.push(c);
        } else {
            let num: u64 = current_num
                .parse()
                .map_err(|_| ScheduleError::InvalidInterval(s.to_string()))?;
            current_num.clear();

            // Accept "ms" as a unit; otherwise single-letter units
            let unit_ms = match c {
                'm' if chars.peek() == Some(&'s') => {
                    chars.next();
                    1
                }
                's' => 1_000,
                'm' => 60_000,
                'h' => 3_600_000,
                'd' => 86_400_000,
                _ => return Err(ScheduleError::InvalidInterval(s.to_string())),
            };
            total_ms += num * unit_ms;
        }
    }

    if total_ms == 0 || !current_num.is_empty() {
        return Err(ScheduleError::InvalidInterval(s.to_string()));
    }

    Ok(std::time::Duration::from_millis(total_ms))
}
