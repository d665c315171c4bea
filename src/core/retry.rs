//! Retry policy for job executions.
//!
//! Fixed-delay retry with a bounded attempt budget, derived from a job
//! definition's retry count and interval.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for a job's handler execution.
///
/// Applies only to handler failures. Configuration errors (unknown handler,
/// duplicate registration) are never retried; the engine short-circuits them
/// before this policy is consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries, not including the initial attempt
    /// (0 = no retries). `retry_count = 2` means up to 3 total attempts.
    pub retry_count: u32,

    /// Fixed delay between attempts.
    #[serde(with = "serde_duration")]
    pub retry_interval: Duration,
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            retry_count: 0,
            retry_interval: Duration::ZERO,
        }
    }

    /// Create a policy with fixed-delay retries.
    pub fn fixed(retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            retry_count,
            retry_interval,
        }
    }

    /// Total attempts this policy allows (initial attempt + retries).
    pub fn max_attempts(&self) -> u32 {
        self.retry_count + 1
    }

    /// Check whether another attempt is allowed after `attempts` have been
    /// made (including failed ones).
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts()
    }
}

impl Default for RetryPolicy {
    /// Default policy: no retries.
    fn default() -> Self {
        Self::none()
    }
}

/// Serde helper for Duration serialization.
///
/// Serializes Duration as whole seconds (matching the YAML config format).
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
