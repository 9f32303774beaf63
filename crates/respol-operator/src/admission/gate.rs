//! Synchronous admission decision.
//!
//! Same matcher and engine path as the reconciler. Policies are evaluated in
//! index order and the first denial (or engine error) rejects the request.
//! Outcomes are always a structured response, never an error to the caller.

use std::sync::Arc;
use std::time::Duration;

use respol_core::error::{PolicyError, Result};
use respol_core::TargetObject;

use crate::config::AdmissionSection;
use crate::engine::{EvalPath, Evaluator};
use crate::index::PolicyIndex;
use crate::obs::OperatorMetrics;

use super::review::{AdmissionRequest, AdmissionResponse, Operation};

pub const ALLOWED_MESSAGE: &str = "Deployment complies with resource policies";

pub struct AdmissionGate {
    index: PolicyIndex,
    evaluator: Evaluator,
    metrics: Arc<OperatorMetrics>,
    timeout: Duration,
    fail_open: bool,
}

impl AdmissionGate {
    pub fn new(cfg: &AdmissionSection, index: PolicyIndex, evaluator: Evaluator, metrics: Arc<OperatorMetrics>) -> Self {
        Self {
            index,
            evaluator,
            metrics,
            timeout: cfg.timeout(),
            fail_open: cfg.fail_open,
        }
    }

    pub async fn review(&self, req: &AdmissionRequest) -> AdmissionResponse {
        tracing::info!(
            name = %req.name,
            namespace = req.namespace.as_deref().unwrap_or(""),
            operation = req.operation.as_str(),
            "admission request"
        );

        let resp = if !matches!(req.operation, Operation::Create | Operation::Update) {
            AdmissionResponse::allowed(&req.uid, "operation not subject to resource policies")
        } else {
            match tokio::time::timeout(self.timeout, self.decide(req)).await {
                Ok(resp) => resp,
                Err(_) if self.fail_open => {
                    tracing::warn!(name = %req.name, timeout = ?self.timeout, "admission deadline exceeded, failing open");
                    AdmissionResponse::allowed(&req.uid, "policy evaluation timed out (fail-open)")
                }
                Err(_) => {
                    tracing::error!(name = %req.name, timeout = ?self.timeout, "admission deadline exceeded");
                    AdmissionResponse::errored(&req.uid, &PolicyError::Timeout)
                }
            }
        };

        let result = match (resp.allowed, resp.code()) {
            (true, _) => "allowed",
            (false, Some(403)) => "denied",
            (false, _) => "errored",
        };
        self.metrics.admissions.inc(&[("result", result)]);
        resp
    }

    async fn decide(&self, req: &AdmissionRequest) -> AdmissionResponse {
        let obj = match decode(req) {
            Ok(obj) => Arc::new(obj),
            Err(e) => {
                tracing::error!(error = %e, "failed to decode deployment");
                return AdmissionResponse::errored(&req.uid, &e);
            }
        };

        let policies = match self.index.list().await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to list policies");
                return AdmissionResponse::errored(&req.uid, &e);
            }
        };
        tracing::debug!(count = policies.len(), deployment = %obj.key(), "evaluating policies");

        for policy in &policies {
            let detail = match self.evaluator.check(EvalPath::Admission, policy, &obj).await {
                None => continue,
                Some(Ok(v)) if v.allowed => continue,
                Some(Ok(v)) => v.reason,
                Some(Err(e)) => format!("policy {}: {e}", policy.name()),
            };

            tracing::warn!(policy = %policy.name(), deployment = %obj.key(), reason = %detail, "admission denied");
            self.metrics.violations.inc(&[("path", EvalPath::Admission.as_str())]);
            return AdmissionResponse::denied(&req.uid, format!("Deployment violates resource policy: {detail}"));
        }

        AdmissionResponse::allowed(&req.uid, ALLOWED_MESSAGE)
    }
}

fn decode(req: &AdmissionRequest) -> Result<TargetObject> {
    let body = req
        .object
        .clone()
        .ok_or_else(|| PolicyError::Decode("request carries no object".into()))?;
    TargetObject::from_value(body, req.namespace.as_deref())
}
