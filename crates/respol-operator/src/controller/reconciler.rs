//! One reconciliation pass: audit every candidate object against one policy.
//!
//! The pass only observes. Violations and engine faults are logged and
//! counted; neither mutates the object nor aborts the pass.

use std::sync::Arc;

use respol_core::error::Result;
use respol_core::{TargetKey, Verdict};

use crate::engine::{EvalPath, Evaluator};
use crate::index::PolicyIndex;
use crate::obs::OperatorMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The policy no longer exists. Nothing to evaluate, nothing to requeue.
    Deleted,
    Evaluated(PassReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub policy: String,
    /// Verdicts for matched targets, in list order.
    pub verdicts: Vec<(TargetKey, Verdict)>,
    /// Matched targets whose evaluation failed.
    pub errors: Vec<(TargetKey, String)>,
    /// Targets the policy does not cover.
    pub skipped: usize,
}

impl PassReport {
    pub fn violations(&self) -> impl Iterator<Item = &(TargetKey, Verdict)> {
        self.verdicts.iter().filter(|(_, v)| !v.allowed)
    }
}

pub struct Reconciler {
    index: PolicyIndex,
    evaluator: Evaluator,
    metrics: Arc<OperatorMetrics>,
}

impl Reconciler {
    pub fn new(index: PolicyIndex, evaluator: Evaluator, metrics: Arc<OperatorMetrics>) -> Self {
        Self {
            index,
            evaluator,
            metrics,
        }
    }

    /// Errors are listing/fetch failures only; the caller retries them.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, policy: &str) -> Result<ReconcileOutcome> {
        let Some(policy) = self.index.get(policy).await? else {
            tracing::debug!("policy gone, skipping");
            return Ok(ReconcileOutcome::Deleted);
        };

        let targets = self.index.store().list_targets().await.map_err(|e| {
            tracing::error!(error = %e, "failed to list deployments");
            e
        })?;

        let mut report = PassReport {
            policy: policy.name().to_string(),
            ..PassReport::default()
        };

        for obj in &targets {
            let Some(res) = self.evaluator.check(EvalPath::Reconcile, &policy, obj).await else {
                tracing::debug!(namespace = %obj.namespace, deployment = %obj.name, "deployment not in target list");
                report.skipped += 1;
                continue;
            };

            match res {
                Ok(verdict) => {
                    if verdict.allowed {
                        tracing::debug!(namespace = %obj.namespace, deployment = %obj.name, "deployment complies");
                    } else {
                        tracing::warn!(
                            namespace = %obj.namespace,
                            deployment = %obj.name,
                            reason = %verdict.reason,
                            "policy violation"
                        );
                        self.metrics.violations.inc(&[("path", EvalPath::Reconcile.as_str())]);
                    }
                    report.verdicts.push((obj.key(), verdict));
                }
                Err(e) => {
                    tracing::error!(
                        namespace = %obj.namespace,
                        deployment = %obj.name,
                        error = %e,
                        "deployment validation failed"
                    );
                    report.errors.push((obj.key(), e.to_string()));
                }
            }
        }

        tracing::info!(
            matched = report.verdicts.len() + report.errors.len(),
            violations = report.violations().count(),
            errors = report.errors.len(),
            "reconciled"
        );
        Ok(ReconcileOutcome::Evaluated(report))
    }
}
