//! Policy/object fixture tests for the shared evaluation path.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;
use std::sync::Mutex;

use serde_json::Value;

use respol_core::{enforce, DecisionEngine, ResourcePolicy, TargetObject};

fn load(name: &str) -> Value {
    let s = fs::read_to_string(format!("tests/fixtures/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

/// Records the input it was handed and answers `true`.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, Value)>>,
}

impl DecisionEngine for Recorder {
    fn evaluate(&self, source: &str, input: &Value) -> respol_core::Result<bool> {
        self.seen.lock().unwrap().push((source.to_string(), input.clone()));
        Ok(true)
    }
}

#[test]
fn engine_sees_full_object_and_policy() {
    let policy: ResourcePolicy = serde_json::from_value(load("policy_full.json")).unwrap();
    let obj = TargetObject::from_value(load("deployment_api.json"), None).unwrap();
    let engine = Recorder::default();

    let verdict = enforce::check(&engine, &policy, &obj).unwrap().unwrap();
    assert!(verdict.allowed);
    assert!(verdict.reason.contains("team-a/api"));

    let seen = engine.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (source, input) = &seen[0];
    assert_eq!(source, &policy.spec.policy);
    assert_eq!(input["deployment"], load("deployment_api.json"));
    assert_eq!(input["policy"]["spec"]["limits"]["ram"], "1Gi");
    assert_eq!(input["policy"]["metadata"]["labels"]["owner"], "platform");
    assert_eq!(input["policy"]["spec"]["targetObjects"].as_array().unwrap().len(), 3);
}

#[test]
fn malformed_entry_does_not_widen_match() {
    let policy: ResourcePolicy = serde_json::from_value(load("policy_full.json")).unwrap();
    let mut body = load("deployment_api.json");
    body["metadata"]["name"] = Value::String("worker".into());
    let obj = TargetObject::from_value(body, None).unwrap();

    assert!(enforce::check(&Recorder::default(), &policy, &obj).is_none());
}
