//! `admission.k8s.io/v1` AdmissionReview wire types (the subset we use).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use respol_core::error::PolicyError;

pub const API_VERSION: &str = "admission.k8s.io/v1";
pub const KIND: &str = "AdmissionReview";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    pub fn from_response(response: AdmissionResponse) -> Self {
        Self {
            api_version: Some(API_VERSION.into()),
            kind: Some(KIND.into()),
            request: None,
            response: Some(response),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<GroupVersionKind>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub operation: Operation,
    /// Raw object body; decoded by the gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl AdmissionResponse {
    pub fn allowed(uid: &str, message: impl Into<String>) -> Self {
        Self {
            uid: uid.to_string(),
            allowed: true,
            status: Some(Status {
                code: 200,
                message: message.into(),
                reason: None,
            }),
        }
    }

    pub fn denied(uid: &str, message: impl Into<String>) -> Self {
        Self {
            uid: uid.to_string(),
            allowed: false,
            status: Some(Status {
                code: 403,
                message: message.into(),
                reason: Some("Forbidden".into()),
            }),
        }
    }

    /// Rejection caused by an error; the status code follows the error class.
    pub fn errored(uid: &str, err: &PolicyError) -> Self {
        Self {
            uid: uid.to_string(),
            allowed: false,
            status: Some(Status {
                code: err.class().http_status(),
                message: err.to_string(),
                reason: Some(err.class().as_str().to_string()),
            }),
        }
    }

    pub fn code(&self) -> Option<u16> {
        self.status.as_ref().map(|s| s.code)
    }

    pub fn message(&self) -> &str {
        self.status.as_ref().map(|s| s.message.as_str()).unwrap_or("")
    }
}
