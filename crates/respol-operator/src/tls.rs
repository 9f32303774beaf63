//! Webhook TLS material.
//!
//! The serving pair is read from `<cert_dir>/tls.crt` and `<cert_dir>/tls.key`.
//! Missing files are a startup error, never a silent fallback to plaintext.

use axum_server::tls_rustls::RustlsConfig;

use respol_core::error::{PolicyError, Result};

use crate::config::OperatorSection;

/// Pin the process-wide rustls provider to aws-lc-rs.
///
/// The kube client links ring and axum-server links aws-lc-rs; with both
/// present rustls refuses to pick a default. Call before any TLS config is
/// built. Repeated calls are harmless.
pub fn install_crypto_provider() {
    // Err only means a provider is already installed.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Load the serving config, or `None` when TLS is disabled.
pub async fn load(op: &OperatorSection) -> Result<Option<RustlsConfig>> {
    if !op.tls {
        tracing::warn!("webhook TLS disabled");
        return Ok(None);
    }

    let (cert, key) = (op.cert_path(), op.key_path());
    for f in [&cert, &key] {
        if !f.is_file() {
            return Err(PolicyError::Config(format!("certificate file not found: {}", f.display())));
        }
    }
    tracing::info!(dir = %op.cert_dir.display(), "certificate files found");

    install_crypto_provider();
    let cfg = RustlsConfig::from_pem_file(cert, key)
        .await
        .map_err(|e| PolicyError::Config(format!("load tls material failed: {e}")))?;
    Ok(Some(cfg))
}
