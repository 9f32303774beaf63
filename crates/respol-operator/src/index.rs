//! Policy index: the read-only view of policy objects shared by both
//! enforcement paths. Freshness follows the store's watch delivery; nothing
//! here writes back. Against a cluster the store answers from reflector
//! caches, so reads here never reach the API server.

use std::sync::Arc;

use respol_core::error::Result;
use respol_core::ResourcePolicy;

use crate::store::ClusterStore;

#[derive(Clone)]
pub struct PolicyIndex {
    store: Arc<dyn ClusterStore>,
}

impl PolicyIndex {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    /// Current snapshot in index-list order.
    pub async fn list(&self) -> Result<Vec<Arc<ResourcePolicy>>> {
        self.store.list_policies().await
    }

    pub async fn get(&self, name: &str) -> Result<Option<Arc<ResourcePolicy>>> {
        self.store.get_policy(name).await
    }

    /// Identities of every known policy.
    pub async fn names(&self) -> Result<Vec<String>> {
        Ok(self.list().await?.iter().map(|p| p.name().to_string()).collect())
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }
}
