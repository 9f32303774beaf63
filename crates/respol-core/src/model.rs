//! Policy and target object model.
//!
//! `ResourcePolicy` mirrors the cluster custom resource
//! (`policies.example.com/v1alpha1`, cluster scoped). Target objects are kept
//! as raw JSON bodies; only their identity is read here.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PolicyError, Result};
use crate::matcher;

/// Object metadata subset. Unknown metadata fields are preserved so the
/// decision engine sees the object as the store returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `ResourcePolicy` custom resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub metadata: ObjectMeta,
    pub spec: PolicySpec,
}

impl ResourcePolicy {
    pub fn new(name: impl Into<String>, spec: PolicySpec) -> Self {
        Self {
            api_version: Some("policies.example.com/v1alpha1".into()),
            kind: Some("ResourcePolicy".into()),
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub target_objects: Vec<TargetRef>,
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Rule program source. Opaque to everything except the decision engine.
    #[serde(default)]
    pub policy: String,
}

impl PolicySpec {
    /// Whether this policy covers the given object.
    pub fn matches(&self, obj: &TargetObject) -> bool {
        matcher::matches(&self.target_objects, &obj.namespace, &obj.name)
    }
}

/// One explicitly enumerated target. No wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub deployment: String,
}

impl TargetRef {
    pub fn new(namespace: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            deployment: deployment.into(),
        }
    }
}

/// Resource-limit hints, handed to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
}

/// (namespace, name) identity of a target object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetKey {
    pub namespace: String,
    pub name: String,
}

impl TargetKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A workload object as seen by the enforcement core.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetObject {
    pub namespace: String,
    pub name: String,
    /// Full object as received; never modified.
    pub body: Value,
}

impl TargetObject {
    /// Build from a raw object body. `metadata.name` is required.
    /// `fallback_namespace` is used when the body carries no namespace
    /// (admission requests for create may omit it).
    pub fn from_value(body: Value, fallback_namespace: Option<&str>) -> Result<Self> {
        let meta = body
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| PolicyError::Decode("object has no metadata".into()))?;

        let name = meta
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PolicyError::Decode("object has no metadata.name".into()))?
            .to_string();

        let namespace = meta
            .get("namespace")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or(fallback_namespace)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            namespace,
            name,
            body,
        })
    }

    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// Outcome of evaluating one (policy, object) pair. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
}

impl Verdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}
