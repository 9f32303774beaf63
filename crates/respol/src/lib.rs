//! Top-level facade crate for respol.
//!
//! Re-exports the core model and the operator library so users can depend on a single crate.

pub mod core {
    pub use respol_core::*;
}

pub mod operator {
    pub use respol_operator::*;
}
