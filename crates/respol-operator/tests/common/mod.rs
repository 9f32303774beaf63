//! Shared fixtures for operator integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use respol_core::error::{PolicyError, Result};
use respol_core::{DecisionEngine, PolicySpec, ResourcePolicy, TargetObject, TargetRef};
use respol_operator::admission::{AdmissionRequest, Operation};
use respol_operator::app_state::AppState;
use respol_operator::config::OperatorConfig;
use respol_operator::obs::OperatorMetrics;
use respol_operator::store::MemoryStore;

/// Engine scripted by the policy source text:
/// `allow`, `deny`, `error`, `compile-error`, `slow` (sleeps, then allows).
#[derive(Default)]
pub struct ScriptedEngine {
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DecisionEngine for ScriptedEngine {
    fn evaluate(&self, source: &str, _input: &Value) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match source {
            "allow" => Ok(true),
            "deny" => Ok(false),
            "compile-error" => Err(PolicyError::Compile("1:1: unexpected token".into())),
            "slow" => {
                std::thread::sleep(Duration::from_millis(400));
                Ok(true)
            }
            _ => Err(PolicyError::Evaluation("division by zero".into())),
        }
    }
}

pub fn policy(name: &str, targets: &[(&str, &str)], source: &str) -> ResourcePolicy {
    ResourcePolicy::new(
        name,
        PolicySpec {
            target_objects: targets.iter().map(|(ns, d)| TargetRef::new(*ns, *d)).collect(),
            policy: source.to_string(),
            ..PolicySpec::default()
        },
    )
}

pub fn deployment_body(ns: &str, name: &str, replicas: u64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": ns },
        "spec": { "replicas": replicas }
    })
}

pub fn deployment(ns: &str, name: &str) -> TargetObject {
    TargetObject::from_value(deployment_body(ns, name, 1), None).unwrap()
}

pub fn request(op: Operation, ns: &str, name: &str) -> AdmissionRequest {
    request_with(op, ns, name, Some(deployment_body(ns, name, 1)))
}

pub fn request_with(op: Operation, ns: &str, name: &str, object: Option<Value>) -> AdmissionRequest {
    AdmissionRequest {
        uid: format!("uid-{ns}-{name}"),
        kind: None,
        name: name.to_string(),
        namespace: Some(ns.to_string()),
        operation: op,
        object,
    }
}

pub fn test_config() -> OperatorConfig {
    let mut cfg = OperatorConfig::default();
    cfg.operator.tls = false;
    cfg.admission.timeout_ms = 150;
    cfg.controller.workers = 2;
    cfg
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<ScriptedEngine>,
    pub state: AppState,
}

pub fn harness(policies: Vec<ResourcePolicy>, targets: Vec<TargetObject>) -> Harness {
    harness_with(test_config(), policies, targets)
}

pub fn harness_with(cfg: OperatorConfig, policies: Vec<ResourcePolicy>, targets: Vec<TargetObject>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    for p in policies {
        store.apply_policy(p).unwrap();
    }
    for t in targets {
        store.apply_target(t).unwrap();
    }
    let engine = Arc::new(ScriptedEngine::default());
    let state = AppState::new(
        cfg,
        store.clone(),
        engine.clone(),
        Arc::new(OperatorMetrics::default()),
    );
    Harness { store, engine, state }
}
