//! Cluster object store access.
//!
//! The operator only reads: policies and target objects are owned by the
//! cluster. `subscribe` exposes the watch stream that drives reconciliation.

pub mod memory;
#[cfg(feature = "kube")]
pub mod kube;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use respol_core::error::Result;
use respol_core::{ResourcePolicy, TargetKey, TargetObject};

pub use memory::MemoryStore;

/// Watch event buffer per subscriber.
pub const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Applied,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Policy { name: String, kind: EventKind },
    Target { key: TargetKey, kind: EventKind },
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// All policies, in the store's list order.
    async fn list_policies(&self) -> Result<Vec<Arc<ResourcePolicy>>>;

    /// `Ok(None)` when the policy does not exist.
    async fn get_policy(&self, name: &str) -> Result<Option<Arc<ResourcePolicy>>>;

    /// All candidate target objects, in the store's list order.
    async fn list_targets(&self) -> Result<Vec<Arc<TargetObject>>>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
