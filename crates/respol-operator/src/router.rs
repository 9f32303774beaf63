//! Axum router wiring.
//!
//! Three surfaces, each bound to its own listener: the admission webhook,
//! health probes, and metrics.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{admission, app_state::AppState, ops};

pub fn build_webhook_router(state: AppState) -> Router {
    let path = state.cfg().admission.path.clone();
    Router::new()
        .route(&path, post(admission::handler::validate))
        .with_state(state)
}

pub fn build_probe_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .with_state(state)
}

pub fn build_metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
