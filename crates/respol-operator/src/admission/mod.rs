//! Admission gate (validating webhook).
//!
//! `gate` holds the decision protocol; `handler` adapts it to the
//! `admission.k8s.io/v1` HTTP contract; `review` holds the wire types.

pub mod gate;
pub mod handler;
pub mod review;

pub use gate::AdmissionGate;
pub use review::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
