//! Dispatch gating.
//!
//! Before dispatching a due fire, the engine consults a [`DispatchGate`]. In a
//! single-node deployment the default [`AlwaysGrant`] gate is used; a
//! multi-node deployment can inject a gate backed by a shared lock so that
//! each fire is dispatched on exactly one node.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::JobDefinition;

/// Decides whether this node may dispatch a given fire.
#[async_trait]
pub trait DispatchGate: Send + Sync {
    /// Returns `true` if the fire should be dispatched here.
    ///
    /// A denied fire is skipped entirely, not queued.
    async fn grant(&self, def: &JobDefinition, fire_time: DateTime<Utc>) -> bool;
}

/// Gate for single-node deployments: every fire is dispatched locally.
pub struct AlwaysGrant;

#[async_trait]
impl DispatchGate for AlwaysGrant {
    async fn grant(&self, _def: &JobDefinition, _fire_time: DateTime<Utc>) -> bool {
        true
    }
}
