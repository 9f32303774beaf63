//! respol operator library entry.
//!
//! Wires the cluster store, policy index, decision engine adapter,
//! reconciliation controller, and admission webhook into one process. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod admission;
pub mod app_state;
pub mod config;
pub mod controller;
pub mod engine;
pub mod index;
pub mod obs;
pub mod ops;
pub mod router;
pub mod store;
pub mod tls;
