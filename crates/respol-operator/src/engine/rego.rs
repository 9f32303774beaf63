//! Rego-backed decision engine.

use regorus::{Engine, QueryResults, Value};
use serde_json::Value as Json;

use respol_core::error::{PolicyError, Result};
use respol_core::DecisionEngine;

use super::cache::ProgramCache;

/// Module path under which a policy's source is loaded.
const MODULE_PATH: &str = "policy.rego";

pub struct RegoEngine {
    query: String,
    cache: Option<ProgramCache>,
}

impl RegoEngine {
    /// Compile on every evaluation.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            cache: None,
        }
    }

    /// Reuse compiled programs keyed by source hash.
    pub fn with_cache(query: impl Into<String>, cache: ProgramCache) -> Self {
        Self {
            query: query.into(),
            cache: Some(cache),
        }
    }

    fn compile(source: &str) -> Result<Engine> {
        let mut engine = Engine::new();
        engine
            .add_policy(MODULE_PATH.to_string(), source.to_string())
            .map_err(|e| PolicyError::Compile(e.to_string()))?;
        Ok(engine)
    }

    fn program(&self, source: &str) -> Result<Engine> {
        match &self.cache {
            Some(cache) => cache.get_or_compile(source, Self::compile),
            None => Self::compile(source),
        }
    }
}

impl DecisionEngine for RegoEngine {
    fn evaluate(&self, source: &str, input: &Json) -> Result<bool> {
        let mut engine = self.program(source)?;

        let input = Value::from_json_str(&input.to_string())
            .map_err(|e| PolicyError::Evaluation(format!("input conversion failed: {e}")))?;
        engine.set_input(input);

        let results = engine
            .eval_query(self.query.clone(), false)
            .map_err(|e| PolicyError::Evaluation(e.to_string()))?;

        single_bool(&self.query, results)
    }
}

/// The query must produce exactly one boolean. Anything else is an
/// evaluation error, never a verdict.
fn single_bool(query: &str, results: QueryResults) -> Result<bool> {
    let value = results
        .result
        .first()
        .and_then(|r| r.expressions.first())
        .map(|e| &e.value)
        .ok_or_else(|| PolicyError::Evaluation(format!("{query} produced an empty result set")))?;

    match value {
        Value::Bool(b) => Ok(*b),
        Value::Undefined => Err(PolicyError::Evaluation(format!("{query} is undefined"))),
        _ => Err(PolicyError::Evaluation(format!("{query} did not evaluate to a boolean"))),
    }
}
