#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use respol_core::TargetKey;
use respol_operator::controller::{triggers, PassReport, ReconcileOutcome};
use respol_operator::store::ClusterStore;

fn evaluated(outcome: ReconcileOutcome) -> PassReport {
    match outcome {
        ReconcileOutcome::Evaluated(r) => r,
        other => panic!("expected evaluated pass, got {other:?}"),
    }
}

#[tokio::test]
async fn deleted_policy_ends_cleanly() {
    let h = harness(vec![policy("limits", &[("team-a", "api")], "deny")], vec![deployment("team-a", "api")]);
    let reconciler = h.state.reconciler();

    h.store.delete_policy("limits").unwrap();
    let outcome = reconciler.reconcile("limits").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Deleted);
    assert_eq!(h.engine.calls(), 0);
}

#[tokio::test]
async fn only_matching_targets_are_evaluated() {
    let h = harness(
        vec![policy("limits", &[("team-a", "api"), ("team-b", "db")], "deny")],
        vec![
            deployment("team-a", "api"),
            deployment("team-a", "worker"),
            deployment("team-b", "db"),
        ],
    );
    let report = evaluated(h.state.reconciler().reconcile("limits").await.unwrap());

    assert_eq!(report.policy, "limits");
    assert_eq!(report.skipped, 1);
    let keys: Vec<_> = report.verdicts.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![TargetKey::new("team-a", "api"), TargetKey::new("team-b", "db")]);
    assert_eq!(report.violations().count(), 2);
    assert_eq!(h.engine.calls(), 2);
    assert_eq!(h.state.metrics().violations.get(&[("path", "reconcile")]), 2);
}

#[tokio::test]
async fn engine_errors_do_not_abort_the_pass() {
    let h = harness(
        vec![
            policy("broken", &[("team-a", "api"), ("team-a", "worker")], "error"),
        ],
        vec![deployment("team-a", "api"), deployment("team-a", "worker")],
    );
    let report = evaluated(h.state.reconciler().reconcile("broken").await.unwrap());
    assert_eq!(report.errors.len(), 2);
    assert!(report.verdicts.is_empty());
    assert_eq!(h.engine.calls(), 2);
    let metrics = h.state.metrics();
    assert_eq!(metrics.engine_errors.get(&[("path", "reconcile"), ("kind", "engine")]), 2);
    assert_eq!(metrics.engine_errors.get(&[("path", "reconcile"), ("kind", "internal")]), 0);
}

#[tokio::test]
async fn target_listing_failure_is_propagated() {
    let h = harness(vec![policy("limits", &[("team-a", "api")], "allow")], vec![deployment("team-a", "api")]);
    h.store.set_fail_target_list(true);
    assert!(h.state.reconciler().reconcile("limits").await.is_err());
}

#[tokio::test]
async fn empty_targets_match_nothing() {
    let h = harness(vec![policy("nothing", &[], "deny")], vec![deployment("team-a", "api")]);
    let report = evaluated(h.state.reconciler().reconcile("nothing").await.unwrap());
    assert!(report.verdicts.is_empty());
    assert_eq!(report.skipped, 1);
    assert_eq!(h.engine.calls(), 0);
}

#[tokio::test]
async fn passes_are_idempotent() {
    let h = harness(
        vec![policy("limits", &[("team-a", "api"), ("team-a", "worker")], "deny")],
        vec![deployment("team-a", "api"), deployment("team-a", "worker"), deployment("team-c", "x")],
    );
    let reconciler = h.state.reconciler();
    let first = reconciler.reconcile("limits").await.unwrap();
    for _ in 0..3 {
        assert_eq!(reconciler.reconcile("limits").await.unwrap(), first);
    }
}

#[tokio::test]
async fn target_change_maps_to_every_policy() {
    let h = harness(
        vec![
            policy("a", &[("team-a", "api")], "allow"),
            policy("b", &[("team-z", "other")], "allow"),
        ],
        vec![],
    );
    let names = triggers::policies_for_target(h.state.index(), &TargetKey::new("team-a", "api")).await;
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

    h.store.set_fail_policy_list(true);
    assert!(triggers::policies_for_target(h.state.index(), &TargetKey::new("team-a", "api")).await.is_empty());
}

#[tokio::test]
async fn controller_reacts_to_events() {
    let h = harness(vec![policy("limits", &[("team-a", "api")], "deny")], vec![]);
    let controller = h.state.controller();
    let queue = controller.queue();

    let events = h.store.subscribe();
    let trig = tokio::spawn(triggers::run(h.state.index().clone(), Arc::clone(&queue), events));
    let workers = controller.spawn(2);

    // Initial listing queues the policy; no targets yet, so the engine is idle.
    wait_for(|| h.state.metrics().reconciles.get(&[("result", "success")]) >= 1).await;
    assert_eq!(h.engine.calls(), 0);

    // A new target triggers a re-evaluation of every policy.
    h.store.apply_target(deployment("team-a", "api")).unwrap();
    wait_for(|| h.engine.calls() >= 1).await;
    wait_for(|| h.state.metrics().violations.get(&[("path", "reconcile")]) >= 1).await;

    // Deleting the policy ends in a clean, non-error pass.
    h.store.delete_policy("limits").unwrap();
    wait_for(|| h.state.metrics().reconciles.get(&[("result", "deleted")]) >= 1).await;
    assert_eq!(h.state.metrics().reconciles.get(&[("result", "error")]), 0);

    trig.abort();
    controller.shutdown(workers).await;
}

#[tokio::test]
async fn failed_pass_is_retried() {
    let h = harness(vec![policy("limits", &[("team-a", "api")], "allow")], vec![deployment("team-a", "api")]);
    h.store.set_fail_target_list(true);

    let controller = h.state.controller();
    let queue = controller.queue();
    let workers = controller.spawn(1);

    queue.add("limits");
    wait_for(|| h.state.metrics().reconciles.get(&[("result", "error")]) >= 2).await;

    h.store.set_fail_target_list(false);
    wait_for(|| h.state.metrics().reconciles.get(&[("result", "success")]) >= 1).await;
    assert_eq!(queue.num_requeues("limits"), 0);

    controller.shutdown(workers).await;
}

async fn wait_for(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
