//! Bounded batch reclamation of append-only log tables.
//!
//! Deleting an unbounded backlog in one statement would hold a long-lived
//! write lock on a hot table while inserts continue. The reclaimer instead
//! deletes in fixed-size chunks until a delete returns a short chunk, the
//! loop's only well-defined termination condition. A hard round cap
//! guarantees termination even against a misbehaving store; reaching it is a
//! reportable error, not a silent stop, since silence could mask unbounded
//! backlog growth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Hard cap on delete rounds in a single reclaim call.
pub const MAX_RECLAIM_ROUNDS: usize = i16::MAX as usize;

/// Errors from a reclaim run.
#[derive(Debug, Error)]
pub enum ReclaimError {
    /// Chunk size must be positive.
    #[error("chunk size must be positive")]
    InvalidChunkSize,

    /// Retention age must be positive. Zero days would make the cutoff
    /// "now" and reclaim the whole table.
    #[error("retention days must be positive")]
    InvalidRetentionDays,

    /// The round cap was reached with qualifying rows possibly remaining.
    /// Chunks already deleted stay deleted; callers re-invoke later.
    #[error("reclaim incomplete after {rounds} rounds, {deleted} rows deleted")]
    Incomplete { rounds: usize, deleted: u64 },

    /// The underlying store failed mid-run. Prior chunks stay committed.
    #[error("store error after {deleted} rows deleted: {source}")]
    Store {
        deleted: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// The minimal interface a log table must offer to be reclaimable.
#[async_trait]
pub trait ReclaimableStore: Send + Sync {
    /// Delete up to `limit` rows with `create_time < cutoff`, returning the
    /// number actually deleted.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

/// Retention parameters for one reclaim job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RetentionPolicy {
    /// Age threshold in days; rows older than this are eligible.
    pub exceed_days: u32,
    /// Chunk size per delete round.
    pub delete_limit: usize,
}

impl RetentionPolicy {
    /// Create a policy. Both parameters must be positive.
    pub fn new(exceed_days: u32, delete_limit: usize) -> Result<Self, ReclaimError> {
        if exceed_days == 0 {
            return Err(ReclaimError::InvalidRetentionDays);
        }
        if delete_limit == 0 {
            return Err(ReclaimError::InvalidChunkSize);
        }
        Ok(Self {
            exceed_days,
            delete_limit,
        })
    }

    /// The cutoff instant implied by this policy, relative to `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.exceed_days))
    }
}

/// Delete all rows older than `older_than` in chunks of `chunk_size`,
/// returning the total deleted.
///
/// Assumes single-writer access to the store for the window being reclaimed;
/// a concurrent reclaimer would invalidate the short-chunk termination
/// condition.
pub async fn reclaim(
    store: &dyn ReclaimableStore,
    older_than: DateTime<Utc>,
    chunk_size: usize,
) -> Result<u64, ReclaimError> {
    if chunk_size == 0 {
        return Err(ReclaimError::InvalidChunkSize);
    }

    let mut deleted: u64 = 0;
    for round in 1..=MAX_RECLAIM_ROUNDS {
        let chunk = store
            .delete_older_than(older_than, chunk_size)
            .await
            .map_err(|source| ReclaimError::Store { deleted, source })?;
        deleted += chunk as u64;

        // A short chunk means no qualifying rows remain
        if chunk < chunk_size {
            tracing::debug!(deleted, rounds = round, "reclaim complete");
            return Ok(deleted);
        }
    }

    tracing::warn!(
        deleted,
        rounds = MAX_RECLAIM_ROUNDS,
        "reclaim round cap reached with rows possibly remaining"
    );
    Err(ReclaimError::Incomplete {
        rounds: MAX_RECLAIM_ROUNDS,
        deleted,
    })
}

/// Convenience wrapper applying a [`RetentionPolicy`] relative to now.
pub async fn reclaim_with_policy(
    store: &dyn ReclaimableStore,
    policy: RetentionPolicy,
) -> Result<u64, ReclaimError> {
    reclaim(store, policy.cutoff(Utc::now()), policy.delete_limit).await
}
