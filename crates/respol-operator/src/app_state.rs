//! Shared application state for the operator.
//!
//! The decision engine is constructed once by the caller and handed in here;
//! the admission gate and every reconciler built from this state share that
//! single `Evaluator`, so both enforcement paths evaluate identically.

use std::sync::Arc;

use respol_core::DecisionEngine;

use crate::admission::AdmissionGate;
use crate::config::OperatorConfig;
use crate::controller::{Controller, Reconciler};
use crate::engine::Evaluator;
use crate::index::PolicyIndex;
use crate::obs::OperatorMetrics;
use crate::store::ClusterStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: OperatorConfig,
    index: PolicyIndex,
    evaluator: Evaluator,
    gate: AdmissionGate,
    metrics: Arc<OperatorMetrics>,
}

impl AppState {
    pub fn new(
        cfg: OperatorConfig,
        store: Arc<dyn ClusterStore>,
        engine: Arc<dyn DecisionEngine>,
        metrics: Arc<OperatorMetrics>,
    ) -> Self {
        let index = PolicyIndex::new(store);
        let evaluator = Evaluator::new(engine, Arc::clone(&metrics));
        let gate = AdmissionGate::new(&cfg.admission, index.clone(), evaluator.clone(), Arc::clone(&metrics));

        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                index,
                evaluator,
                gate,
                metrics,
            }),
        }
    }

    pub fn cfg(&self) -> &OperatorConfig {
        &self.inner.cfg
    }

    pub fn index(&self) -> &PolicyIndex {
        &self.inner.index
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.inner.gate
    }

    pub fn metrics(&self) -> Arc<OperatorMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.inner.index.clone(),
            self.inner.evaluator.clone(),
            Arc::clone(&self.inner.metrics),
        )
    }

    pub fn controller(&self) -> Controller {
        Controller::new(&self.inner.cfg.controller, self.reconciler(), self.metrics())
    }

    pub fn set_ready(&self, ready: bool) {
        self.inner.metrics.set_ready(ready);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.metrics.is_ready()
    }
}
