#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use respol_operator::router;

async fn post(app: axum::Router, body: String) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::post("/validate-deployment")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn review(ns: &str, name: &str) -> String {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "abc-123",
            "kind": { "group": "apps", "version": "v1", "kind": "Deployment" },
            "name": name,
            "namespace": ns,
            "operation": "CREATE",
            "object": deployment_body(ns, name, 3)
        }
    })
    .to_string()
}

#[tokio::test]
async fn denial_round_trips_as_admission_review() {
    let h = harness(vec![policy("limits", &[("team-a", "api")], "deny")], vec![]);
    let (status, body) = post(router::build_webhook_router(h.state.clone()), review("team-a", "api")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apiVersion"], "admission.k8s.io/v1");
    assert_eq!(body["kind"], "AdmissionReview");
    assert_eq!(body["response"]["uid"], "abc-123");
    assert_eq!(body["response"]["allowed"], false);
    assert!(body["response"]["status"]["message"].as_str().unwrap().contains("limits"));
}

#[tokio::test]
async fn allowed_review() {
    let h = harness(vec![policy("limits", &[("team-a", "api")], "allow")], vec![]);
    let (status, body) = post(router::build_webhook_router(h.state.clone()), review("team-a", "api")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["allowed"], true);
}

#[tokio::test]
async fn malformed_envelope_is_bad_request() {
    let h = harness(vec![], vec![]);
    let (status, body) = post(router::build_webhook_router(h.state.clone()), "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 400);

    let (status, _) = post(
        router::build_webhook_router(h.state.clone()),
        json!({ "apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview" }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn probes_and_metrics() {
    let h = harness(vec![], vec![]);
    let probes = router::build_probe_router(h.state.clone());

    let resp = probes
        .clone()
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    h.state.set_ready(true);
    let resp = probes
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router::build_metrics_router(h.state.clone())
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(resp.into_body(), 1 << 20).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("respol_ready 1"));
}
