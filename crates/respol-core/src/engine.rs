//! Decision engine contract.
//!
//! The engine compiles a policy's rule program and evaluates the canonical
//! boolean query against an input document. Parsing, sandboxing and result
//! typing stay behind this trait.

use serde_json::Value;

use crate::error::Result;

/// Canonical boolean query every rule program must define.
pub const ALLOW_QUERY: &str = "data.kubernetes.policy.allow";

/// Opaque policy evaluator.
///
/// Implementations must return `Ok(true)`/`Ok(false)` only for a clean boolean
/// result. Compile failures map to `PolicyError::Compile`; runtime faults and
/// empty or non-boolean results map to `PolicyError::Evaluation`.
pub trait DecisionEngine: Send + Sync {
    fn evaluate(&self, source: &str, input: &Value) -> Result<bool>;
}

impl<E: DecisionEngine + ?Sized> DecisionEngine for std::sync::Arc<E> {
    fn evaluate(&self, source: &str, input: &Value) -> Result<bool> {
        (**self).evaluate(source, input)
    }
}
