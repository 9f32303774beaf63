//! Kubernetes-backed store (cargo feature `kube`).
//!
//! Policies are read as dynamic objects of `policies.example.com/v1alpha1`
//! `ResourcePolicy`; targets are `apps/v1` Deployments. Both kinds are kept in
//! reflector stores fed by watchers, so every read is served from memory and
//! never issues a LIST against the API server.
//!
//! A policy that fails to decode fails every read that would include it, on
//! both paths: admission rejects (500) and the reconciler retries with backoff.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use respol_core::error::{PolicyError, Result};
use respol_core::{ResourcePolicy, TargetKey, TargetObject};

use super::{ClusterStore, EventKind, StoreEvent, EVENT_BUFFER};

const GROUP: &str = "policies.example.com";
const VERSION: &str = "v1alpha1";
const KIND: &str = "ResourcePolicy";
const PLURAL: &str = "resourcepolicies";

/// API resource of the cluster-scoped `ResourcePolicy` CRD.
pub fn policy_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(GROUP, VERSION, KIND);
    ApiResource::from_gvk_with_plural(&gvk, PLURAL)
}

fn store_err(e: impl std::fmt::Display) -> PolicyError {
    PolicyError::Store(e.to_string())
}

fn convert<S: Serialize, T: DeserializeOwned>(obj: &S) -> Result<T> {
    let v = serde_json::to_value(obj).map_err(|e| PolicyError::Decode(e.to_string()))?;
    serde_json::from_value(v).map_err(|e| PolicyError::Decode(e.to_string()))
}

fn decode_policy(obj: &DynamicObject) -> Result<ResourcePolicy> {
    convert(obj).map_err(|e| PolicyError::Store(format!("policy {} is malformed: {e}", obj.name_any())))
}

fn to_target(d: &Deployment) -> Result<TargetObject> {
    let v = serde_json::to_value(d).map_err(|e| PolicyError::Decode(e.to_string()))?;
    TargetObject::from_value(v, None)
}

fn policy_event(obj: &DynamicObject, kind: EventKind) -> Option<StoreEvent> {
    Some(StoreEvent::Policy { name: obj.name_any(), kind })
}

fn target_event(obj: &Deployment, kind: EventKind) -> Option<StoreEvent> {
    let namespace = obj.namespace()?;
    Some(StoreEvent::Target { key: TargetKey::new(namespace, obj.name_any()), kind })
}

/// Translate one watcher event. Init markers carry no object change.
fn watch_event<K>(ev: &watcher::Event<K>, map: impl Fn(&K, EventKind) -> Option<StoreEvent>) -> Option<StoreEvent> {
    match ev {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => map(obj, EventKind::Applied),
        watcher::Event::Delete(obj) => map(obj, EventKind::Deleted),
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

/// In-memory read view over the reflector stores.
#[derive(Clone)]
pub struct ClusterCache {
    resource: ApiResource,
    policies: Store<DynamicObject>,
    deployments: Store<Deployment>,
}

impl ClusterCache {
    /// Policies sorted by name, the same list order the in-process store uses.
    pub fn policies(&self) -> Result<Vec<Arc<ResourcePolicy>>> {
        let mut out = self
            .policies
            .state()
            .iter()
            .map(|obj| decode_policy(obj).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        out.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(out)
    }

    pub fn policy(&self, name: &str) -> Result<Option<Arc<ResourcePolicy>>> {
        match self.policies.get(&ObjectRef::new_with(name, self.resource.clone())) {
            Some(obj) => Ok(Some(Arc::new(decode_policy(&obj)?))),
            None => Ok(None),
        }
    }

    pub fn targets(&self) -> Result<Vec<Arc<TargetObject>>> {
        let mut out = self
            .deployments
            .state()
            .iter()
            .map(|d| to_target(d).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        out.sort_by_key(|t| t.key());
        Ok(out)
    }

    /// Every cached policy, as controller object references. A deployment
    /// change maps to all of them.
    pub fn policy_refs(&self) -> Vec<ObjectRef<DynamicObject>> {
        self.policies
            .state()
            .iter()
            .map(|obj| ObjectRef::new_with(&obj.name_any(), self.resource.clone()))
            .collect()
    }
}

pub struct KubeStore {
    resource: ApiResource,
    policy_api: Api<DynamicObject>,
    deployment_api: Api<Deployment>,
    cache: ClusterCache,
    events: broadcast::Sender<StoreEvent>,
}

impl KubeStore {
    /// Connect using the in-cluster or kubeconfig environment and start the
    /// policy and deployment reflectors.
    pub async fn connect() -> Result<(Self, Vec<JoinHandle<()>>)> {
        let client = Client::try_default().await.map_err(store_err)?;
        let resource = policy_resource();
        let policy_api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        let deployment_api: Api<Deployment> = Api::all(client);

        let policy_writer = reflector::store::Writer::new(resource.clone());
        let deployment_writer = reflector::store::Writer::<Deployment>::default();
        let cache = ClusterCache {
            resource: resource.clone(),
            policies: policy_writer.as_reader(),
            deployments: deployment_writer.as_reader(),
        };

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let watchers = vec![
            tokio::spawn(reflect_loop(policy_api.clone(), policy_writer, events.clone(), policy_event)),
            tokio::spawn(reflect_loop(deployment_api.clone(), deployment_writer, events.clone(), target_event)),
        ];

        let store = Self {
            resource,
            policy_api,
            deployment_api,
            cache,
            events,
        };
        Ok((store, watchers))
    }

    /// Resolve once both reflectors hold a complete initial list.
    pub async fn wait_synced(&self) -> Result<()> {
        self.cache
            .policies
            .wait_until_ready()
            .await
            .map_err(|_| PolicyError::Store("policy reflector stopped before sync".into()))?;
        self.cache
            .deployments
            .wait_until_ready()
            .await
            .map_err(|_| PolicyError::Store("deployment reflector stopped before sync".into()))
    }

    pub fn resource(&self) -> &ApiResource {
        &self.resource
    }

    pub fn policy_api(&self) -> Api<DynamicObject> {
        self.policy_api.clone()
    }

    pub fn deployment_api(&self) -> Api<Deployment> {
        self.deployment_api.clone()
    }

    pub fn cache(&self) -> ClusterCache {
        self.cache.clone()
    }
}

async fn reflect_loop<K, F>(api: Api<K>, writer: reflector::store::Writer<K>, events: broadcast::Sender<StoreEvent>, map: F)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone,
    F: Fn(&K, EventKind) -> Option<StoreEvent> + Send + 'static,
{
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer);
    futures_util::pin_mut!(stream);
    while let Some(ev) = stream.next().await {
        match ev {
            Ok(ev) => {
                if let Some(ev) = watch_event(&ev, &map) {
                    let _ = events.send(ev);
                }
            }
            Err(e) => tracing::warn!(error = %e, "watch stream error"),
        }
    }
    tracing::warn!("watch stream ended");
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn list_policies(&self) -> Result<Vec<Arc<ResourcePolicy>>> {
        self.cache.policies()
    }

    async fn get_policy(&self, name: &str) -> Result<Option<Arc<ResourcePolicy>>> {
        self.cache.policy(name)
    }

    async fn list_targets(&self) -> Result<Vec<Arc<TargetObject>>> {
        self.cache.targets()
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
