//! Reconciliation controller.
//!
//! Event-driven: policy and target events (via `triggers`) and the resync
//! timer feed a keyed `WorkQueue`; a fixed pool of workers drains it. Keys are
//! policy names, so passes for one policy are serialized while distinct
//! policies reconcile concurrently.
//!
//! Against a real cluster the same `Reconciler` runs under
//! `kube::runtime::Controller` instead (see `cluster`).

#[cfg(feature = "kube")]
pub mod cluster;
pub mod queue;
pub mod reconciler;
pub mod triggers;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ControllerSection;
use crate::obs::OperatorMetrics;

pub use queue::{Backoff, WorkQueue};
pub use reconciler::{PassReport, ReconcileOutcome, Reconciler};

pub struct Controller {
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<OperatorMetrics>,
    resync: Duration,
}

impl Controller {
    pub fn new(cfg: &ControllerSection, reconciler: Reconciler, metrics: Arc<OperatorMetrics>) -> Self {
        Self {
            queue: WorkQueue::new(Backoff::from_config(cfg)),
            reconciler: Arc::new(reconciler),
            metrics,
            resync: cfg.resync(),
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Spawn `workers` queue consumers.
    pub fn spawn(&self, workers: usize) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|id| {
                let queue = Arc::clone(&self.queue);
                let reconciler = Arc::clone(&self.reconciler);
                let metrics = Arc::clone(&self.metrics);
                let resync = self.resync;
                tokio::spawn(async move { worker(id, queue, reconciler, metrics, resync).await })
            })
            .collect()
    }

    /// Stop handing out work and wait for in-flight passes.
    pub async fn shutdown(&self, workers: Vec<JoinHandle<()>>) {
        self.queue.shutdown();
        for res in futures_util::future::join_all(workers).await {
            if let Err(e) = res {
                tracing::error!(error = %e, "controller worker panicked");
            }
        }
    }
}

async fn worker(
    id: usize,
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<OperatorMetrics>,
    resync: Duration,
) {
    tracing::debug!(worker = id, "controller worker started");
    while let Some(key) = queue.get().await {
        metrics.queue_depth.set(queue.len() as i64);

        match reconciler.reconcile(&key).await {
            Ok(ReconcileOutcome::Evaluated(_)) => {
                metrics.reconciles.inc(&[("result", "success")]);
                queue.forget(&key);
                queue.add_after(&key, resync);
            }
            Ok(ReconcileOutcome::Deleted) => {
                metrics.reconciles.inc(&[("result", "deleted")]);
                queue.forget(&key);
            }
            Err(e) => {
                metrics.reconciles.inc(&[("result", "error")]);
                let delay = queue.add_rate_limited(&key);
                tracing::warn!(policy = %key, error = %e, retry_in = ?delay, "reconcile failed");
            }
        }

        queue.done(&key);
    }
    tracing::debug!(worker = id, "controller worker stopped");
}
