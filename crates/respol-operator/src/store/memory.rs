//! In-process object store.
//!
//! Backs standalone runs (optionally seeded from a YAML manifest) and tests.
//! Policies list in name order, targets in (namespace, name) order.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;

use respol_core::error::{PolicyError, Result};
use respol_core::{ResourcePolicy, TargetKey, TargetObject};

use super::{ClusterStore, EventKind, StoreEvent, EVENT_BUFFER};

/// Seed manifest: `policies:` and `deployments:` lists.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    #[serde(default)]
    pub policies: Vec<ResourcePolicy>,
    #[serde(default)]
    pub deployments: Vec<serde_json::Value>,
}

#[derive(Default)]
struct Objects {
    policies: BTreeMap<String, Arc<ResourcePolicy>>,
    targets: BTreeMap<TargetKey, Arc<TargetObject>>,
}

pub struct MemoryStore {
    objects: RwLock<Objects>,
    events: broadcast::Sender<StoreEvent>,
    fail_policy_list: AtomicBool,
    fail_target_list: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            objects: RwLock::new(Objects::default()),
            events,
            fail_policy_list: AtomicBool::new(false),
            fail_target_list: AtomicBool::new(false),
        }
    }

    pub fn from_seed(seed: Seed) -> Result<Self> {
        let store = Self::new();
        for p in seed.policies {
            store.apply_policy(p)?;
        }
        for d in seed.deployments {
            store.apply_target(TargetObject::from_value(d, None)?)?;
        }
        Ok(store)
    }

    pub fn load_seed(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::Config(format!("read seed failed ({}): {e}", path.display())))?;
        let seed: Seed = serde_yaml::from_str(&s)
            .map_err(|e| PolicyError::Config(format!("invalid seed yaml: {e}")))?;
        Self::from_seed(seed)
    }

    pub fn apply_policy(&self, policy: ResourcePolicy) -> Result<()> {
        let name = policy.name().to_string();
        if name.is_empty() {
            return Err(PolicyError::BadRequest("policy metadata.name must not be empty".into()));
        }
        self.write()?.policies.insert(name.clone(), Arc::new(policy));
        self.publish(StoreEvent::Policy { name, kind: EventKind::Applied });
        Ok(())
    }

    pub fn delete_policy(&self, name: &str) -> Result<bool> {
        let removed = self.write()?.policies.remove(name).is_some();
        if removed {
            self.publish(StoreEvent::Policy { name: name.to_string(), kind: EventKind::Deleted });
        }
        Ok(removed)
    }

    pub fn apply_target(&self, obj: TargetObject) -> Result<()> {
        let key = obj.key();
        self.write()?.targets.insert(key.clone(), Arc::new(obj));
        self.publish(StoreEvent::Target { key, kind: EventKind::Applied });
        Ok(())
    }

    pub fn delete_target(&self, key: &TargetKey) -> Result<bool> {
        let removed = self.write()?.targets.remove(key).is_some();
        if removed {
            self.publish(StoreEvent::Target { key: key.clone(), kind: EventKind::Deleted });
        }
        Ok(removed)
    }

    /// Make subsequent policy listings fail (transient infrastructure fault).
    pub fn set_fail_policy_list(&self, fail: bool) {
        self.fail_policy_list.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent target listings fail (transient infrastructure fault).
    pub fn set_fail_target_list(&self, fail: bool) {
        self.fail_target_list.store(fail, Ordering::SeqCst);
    }

    fn publish(&self, ev: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(ev);
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Objects>> {
        self.objects
            .read()
            .map_err(|_| PolicyError::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Objects>> {
        self.objects
            .write()
            .map_err(|_| PolicyError::Internal("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn list_policies(&self) -> Result<Vec<Arc<ResourcePolicy>>> {
        if self.fail_policy_list.load(Ordering::SeqCst) {
            return Err(PolicyError::Store("list resourcepolicies: injected failure".into()));
        }
        Ok(self.read()?.policies.values().cloned().collect())
    }

    async fn get_policy(&self, name: &str) -> Result<Option<Arc<ResourcePolicy>>> {
        Ok(self.read()?.policies.get(name).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<Arc<TargetObject>>> {
        if self.fail_target_list.load(Ordering::SeqCst) {
            return Err(PolicyError::Store("list deployments: injected failure".into()));
        }
        Ok(self.read()?.targets.values().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
