//! HTTP adapter for the admission gate.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::app_state::AppState;

use super::review::AdmissionReview;

/// Envelope-level failures: the body is not an AdmissionReview at all, so no
/// review response can be addressed to a request uid.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed admission review: {0}")]
    Malformed(String),
    #[error("admission review has no request")]
    MissingRequest,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": StatusCode::BAD_REQUEST.as_u16(),
                "message": self.to_string(),
            }
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

pub async fn validate(
    State(state): State<AppState>,
    review: Result<Json<AdmissionReview>, JsonRejection>,
) -> Result<Json<AdmissionReview>, WebhookError> {
    let Json(review) = review.map_err(|e| {
        tracing::warn!(error = %e, "rejecting malformed admission review");
        WebhookError::Malformed(e.body_text())
    })?;
    let request = review.request.ok_or(WebhookError::MissingRequest)?;

    let response = state.gate().review(&request).await;
    Ok(Json(AdmissionReview::from_response(response)))
}
