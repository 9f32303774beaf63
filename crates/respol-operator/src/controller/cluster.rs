//! Cluster-mode scheduling through `kube::runtime::Controller`.
//!
//! The controller owns the policy watch and the work queue. Deployment events
//! map to every cached policy. A finished pass requeues after the resync
//! interval; a failed one backs off per policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DynamicObject;
use kube::runtime::controller::{Action, Config as ControllerConfig, Controller};
use kube::runtime::watcher;
use kube::ResourceExt;

use respol_core::error::PolicyError;

use crate::config::ControllerSection;
use crate::obs::OperatorMetrics;
use crate::store::kube::KubeStore;

use super::{Backoff, ReconcileOutcome, Reconciler};

pub struct Context {
    reconciler: Reconciler,
    metrics: Arc<OperatorMetrics>,
    resync: Duration,
    backoff: Backoff,
    failures: DashMap<String, u32>,
}

impl Context {
    pub fn new(cfg: &ControllerSection, reconciler: Reconciler, metrics: Arc<OperatorMetrics>) -> Self {
        Self {
            reconciler,
            metrics,
            resync: cfg.resync(),
            backoff: Backoff::from_config(cfg),
            failures: DashMap::new(),
        }
    }
}

pub async fn reconcile(obj: Arc<DynamicObject>, ctx: Arc<Context>) -> Result<Action, PolicyError> {
    let name = obj.name_any();
    let outcome = ctx.reconciler.reconcile(&name).await?;
    ctx.failures.remove(&name);
    match outcome {
        ReconcileOutcome::Evaluated(_) => {
            ctx.metrics.reconciles.inc(&[("result", "success")]);
            Ok(Action::requeue(ctx.resync))
        }
        ReconcileOutcome::Deleted => {
            ctx.metrics.reconciles.inc(&[("result", "deleted")]);
            Ok(Action::await_change())
        }
    }
}

pub fn error_policy(obj: Arc<DynamicObject>, err: &PolicyError, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let failures = {
        let mut n = ctx.failures.entry(name.clone()).or_insert(0);
        *n += 1;
        *n
    };
    let delay = ctx.backoff.delay(failures);
    ctx.metrics.reconciles.inc(&[("result", "error")]);
    tracing::warn!(policy = %name, error = %err, retry_in = ?delay, "reconcile failed");
    Action::requeue(delay)
}

/// Run until `shutdown` resolves and in-flight passes finish.
pub async fn run<S>(
    store: Arc<KubeStore>,
    cfg: ControllerSection,
    reconciler: Reconciler,
    metrics: Arc<OperatorMetrics>,
    shutdown: S,
) where
    S: Future<Output = ()> + Send + Sync + 'static,
{
    let cache = store.cache();
    let workers = u16::try_from(cfg.workers).unwrap_or(u16::MAX);
    let ctx = Arc::new(Context::new(&cfg, reconciler, metrics));

    Controller::new_with(store.policy_api(), watcher::Config::default(), store.resource().clone())
        .watches(store.deployment_api(), watcher::Config::default(), move |_: Deployment| cache.policy_refs())
        .with_config(ControllerConfig::default().concurrency(workers))
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => tracing::debug!(policy = %obj.name, "reconciled"),
                Err(e) => tracing::warn!(error = %e, "controller error"),
            }
        })
        .await;
    tracing::info!("resource policy controller stopped");
}
