//! respol core: cluster-agnostic policy model, target matching, the decision
//! engine contract, and the shared error surface.
//!
//! Both enforcement paths (the reconciler and the admission gate) evaluate a
//! (policy, object) pair exclusively through [`enforce::check`], so the two
//! paths cannot diverge on a verdict for the same index snapshot.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `PolicyError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod enforce;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;

/// Shared result type.
pub use error::{PolicyError, Result};
pub use engine::{DecisionEngine, ALLOW_QUERY};
pub use model::{ObjectMeta, PolicySpec, ResourceLimits, ResourcePolicy, TargetKey, TargetObject, TargetRef, Verdict};
