//! The single (policy, object) evaluation path shared by reconciliation and
//! admission.

use serde_json::{json, Value};

use crate::engine::DecisionEngine;
use crate::error::{PolicyError, Result};
use crate::model::{ResourcePolicy, TargetObject, Verdict};

/// Engine input document: `{"deployment": <object>, "policy": <policy>}`.
pub fn engine_input(policy: &ResourcePolicy, obj: &TargetObject) -> Result<Value> {
    let policy = serde_json::to_value(policy)
        .map_err(|e| PolicyError::Internal(format!("policy encode failed: {e}")))?;
    Ok(json!({
        "deployment": obj.body,
        "policy": policy,
    }))
}

/// Evaluate a pair without consulting the matcher.
pub fn evaluate(engine: &dyn DecisionEngine, policy: &ResourcePolicy, obj: &TargetObject) -> Result<Verdict> {
    let input = engine_input(policy, obj)?;
    let allowed = engine.evaluate(&policy.spec.policy, &input)?;
    tracing::trace!(policy = %policy.name(), deployment = %obj.key(), allowed, "evaluated");
    Ok(verdict_for(policy, obj, allowed))
}

/// Whether `policy` covers `obj`. Callers may use it to skip scheduling work;
/// the verdict itself still comes from [`check`].
pub fn applies(policy: &ResourcePolicy, obj: &TargetObject) -> bool {
    policy.spec.matches(obj)
}

/// Match, then evaluate. `None` means the policy does not cover the object and
/// the engine was not invoked.
pub fn check(engine: &dyn DecisionEngine, policy: &ResourcePolicy, obj: &TargetObject) -> Option<Result<Verdict>> {
    if !applies(policy, obj) {
        return None;
    }
    Some(evaluate(engine, policy, obj))
}

/// Shape an engine boolean into a verdict with a human-readable reason.
pub fn verdict_for(policy: &ResourcePolicy, obj: &TargetObject, allowed: bool) -> Verdict {
    if allowed {
        Verdict::allow(format!(
            "deployment {} complies with resource policy {}",
            obj.key(),
            policy.name()
        ))
    } else {
        Verdict::deny(format!(
            "deployment {} violates resource policy {}",
            obj.name,
            policy.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::{PolicySpec, TargetRef};

    struct Fixed {
        answer: Result<bool>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(answer: Result<bool>) -> Self {
            Self { answer, calls: AtomicUsize::new(0) }
        }
    }

    impl DecisionEngine for Fixed {
        fn evaluate(&self, _source: &str, input: &Value) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(input.get("deployment").is_some());
            assert!(input["policy"]["spec"]["targetObjects"].is_array());
            match &self.answer {
                Ok(b) => Ok(*b),
                Err(e) => Err(PolicyError::Evaluation(e.to_string())),
            }
        }
    }

    fn policy() -> ResourcePolicy {
        ResourcePolicy::new(
            "p1",
            PolicySpec {
                target_objects: vec![TargetRef::new("team-a", "api")],
                ..PolicySpec::default()
            },
        )
    }

    fn object(name: &str) -> TargetObject {
        TargetObject::from_value(json!({ "metadata": { "name": name, "namespace": "team-a" } }), None).unwrap()
    }

    #[test]
    fn unmatched_skips_engine() {
        let engine = Fixed::new(Ok(false));
        assert!(!applies(&policy(), &object("worker")));
        assert!(check(&engine, &policy(), &object("worker")).is_none());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn deny_reason_names_policy() {
        let engine = Fixed::new(Ok(false));
        let v = check(&engine, &policy(), &object("api")).unwrap().unwrap();
        assert!(!v.allowed);
        assert_eq!(v.reason, "deployment api violates resource policy p1");
    }

    #[test]
    fn engine_error_is_not_a_verdict() {
        let engine = Fixed::new(Err(PolicyError::Evaluation("boom".into())));
        match check(&engine, &policy(), &object("api")) {
            Some(Err(e)) => assert!(e.is_engine_error()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
