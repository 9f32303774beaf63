//! Decision engine adapter.
//!
//! `RegoEngine` implements the core `DecisionEngine` contract on top of the
//! `regorus` interpreter. `Evaluator` is the async handle both enforcement
//! paths share: one engine instance, built once at startup, evaluated on the
//! blocking pool so a caller's deadline can abandon an in-flight evaluation.

pub mod cache;
pub mod rego;

use std::sync::Arc;
use std::time::Instant;

use respol_core::enforce;
use respol_core::error::{PolicyError, Result};
use respol_core::{DecisionEngine, ResourcePolicy, TargetObject, Verdict};

use crate::obs::OperatorMetrics;

pub use cache::ProgramCache;
pub use rego::RegoEngine;

/// Which enforcement path requested an evaluation (metrics label).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPath {
    Reconcile,
    Admission,
}

impl EvalPath {
    pub fn as_str(self) -> &'static str {
        match self {
            EvalPath::Reconcile => "reconcile",
            EvalPath::Admission => "admission",
        }
    }
}

#[derive(Clone)]
pub struct Evaluator {
    engine: Arc<dyn DecisionEngine>,
    metrics: Arc<OperatorMetrics>,
}

impl Evaluator {
    pub fn new(engine: Arc<dyn DecisionEngine>, metrics: Arc<OperatorMetrics>) -> Self {
        Self { engine, metrics }
    }

    /// Match, then evaluate. `None` when the policy does not cover `obj`;
    /// the engine is not consulted in that case.
    pub async fn check(
        &self,
        path: EvalPath,
        policy: &Arc<ResourcePolicy>,
        obj: &Arc<TargetObject>,
    ) -> Option<Result<Verdict>> {
        if !enforce::applies(policy, obj) {
            return None;
        }

        let engine = Arc::clone(&self.engine);
        let policy = Arc::clone(policy);
        let obj = Arc::clone(obj);
        let start = Instant::now();

        let res = tokio::task::spawn_blocking(move || enforce::check(engine.as_ref(), &policy, &obj))
            .await
            .unwrap_or_else(|e| Some(Err(PolicyError::Internal(format!("evaluation task failed: {e}")))))?;

        let outcome = match &res {
            Ok(v) if v.allowed => "allow",
            Ok(_) => "deny",
            Err(_) => "error",
        };
        self.metrics.engine_duration.observe(
            &[("path", path.as_str()), ("outcome", outcome)],
            start.elapsed(),
        );
        if let Err(e) = &res {
            let kind = if e.is_engine_error() { "engine" } else { "internal" };
            self.metrics.engine_errors.inc(&[("path", path.as_str()), ("kind", kind)]);
        }

        Some(res)
    }
}

/// Build the process-wide engine from config.
pub fn build(cfg: &crate::config::EngineSection, metrics: Arc<OperatorMetrics>) -> Arc<dyn DecisionEngine> {
    let engine = if cfg.cache {
        RegoEngine::with_cache(cfg.query.clone(), ProgramCache::new(cfg.cache_capacity, metrics))
    } else {
        RegoEngine::new(cfg.query.clone())
    };
    Arc::new(engine)
}
