//! Watch wiring: store events -> queued policy identities.
//!
//! A target object change requeues every known policy, not only those whose
//! targets list it. The matcher filters inside the pass; the redundant work is
//! accepted since there is no reverse index from objects to policies.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use respol_core::TargetKey;

use crate::index::PolicyIndex;
use crate::store::StoreEvent;

use super::queue::WorkQueue;

/// Map a changed target object to the policies to re-evaluate: all of them.
/// A listing failure yields no requests; the resync interval covers the gap.
pub async fn policies_for_target(index: &PolicyIndex, key: &TargetKey) -> Vec<String> {
    match index.names().await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(deployment = %key, error = %e, "cannot map target to policies");
            Vec::new()
        }
    }
}

async fn requeue_all(index: &PolicyIndex, queue: &WorkQueue) {
    match index.names().await {
        Ok(names) => names.iter().for_each(|n| queue.add(n)),
        Err(e) => tracing::warn!(error = %e, "resync listing failed"),
    }
}

/// Feed the queue until the event stream closes. Subscribe before calling so
/// no event between the initial listing and the first `recv` is lost.
pub async fn run(index: PolicyIndex, queue: Arc<WorkQueue>, mut events: broadcast::Receiver<StoreEvent>) {
    requeue_all(&index, &queue).await;

    loop {
        match events.recv().await {
            Ok(StoreEvent::Policy { name, kind }) => {
                tracing::debug!(policy = %name, ?kind, "policy event");
                queue.add(&name);
            }
            Ok(StoreEvent::Target { key, kind }) => {
                tracing::debug!(deployment = %key, ?kind, "deployment event");
                for name in policies_for_target(&index, &key).await {
                    queue.add(&name);
                }
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event stream lagged, requeueing all policies");
                requeue_all(&index, &queue).await;
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::info!("event stream closed");
}
