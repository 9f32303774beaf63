use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use respol_core::error::{PolicyError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    pub version: u32,

    #[serde(default)]
    pub operator: OperatorSection,

    #[serde(default)]
    pub controller: ControllerSection,

    #[serde(default)]
    pub admission: AdmissionSection,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub store: StoreSection,
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PolicyError::Config(format!("unsupported config version: {}", self.version)));
        }
        self.operator.validate()?;
        self.controller.validate()?;
        self.admission.validate()?;
        self.engine.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            version: 1,
            operator: OperatorSection::default(),
            controller: ControllerSection::default(),
            admission: AdmissionSection::default(),
            engine: EngineSection::default(),
            store: StoreSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorSection {
    #[serde(default = "default_webhook_listen")]
    pub webhook_listen: String,

    #[serde(default = "default_probe_listen")]
    pub probe_listen: String,

    #[serde(default = "default_metrics_listen")]
    pub metrics_listen: String,

    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,

    /// Serve the webhook over TLS (the cluster requires it; disable only for local runs).
    #[serde(default = "default_true")]
    pub tls: bool,
}

impl Default for OperatorSection {
    fn default() -> Self {
        Self {
            webhook_listen: default_webhook_listen(),
            probe_listen: default_probe_listen(),
            metrics_listen: default_metrics_listen(),
            cert_dir: default_cert_dir(),
            tls: true,
        }
    }
}

impl OperatorSection {
    pub fn validate(&self) -> Result<()> {
        for (field, v) in [
            ("operator.webhook_listen", &self.webhook_listen),
            ("operator.probe_listen", &self.probe_listen),
            ("operator.metrics_listen", &self.metrics_listen),
        ] {
            parse_listen(v).map_err(|e| PolicyError::Config(format!("{field}: {e}")))?;
        }
        Ok(())
    }

    pub fn webhook_addr(&self) -> Result<SocketAddr> {
        parse_listen(&self.webhook_listen)
    }

    pub fn probe_addr(&self) -> Result<SocketAddr> {
        parse_listen(&self.probe_listen)
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr> {
        parse_listen(&self.metrics_listen)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join("tls.crt")
    }

    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join("tls.key")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerSection {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Re-check interval after every completed pass.
    #[serde(default = "default_resync_secs")]
    pub resync_secs: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resync_secs: default_resync_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl ControllerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=64).contains(&self.workers) {
            return Err(PolicyError::Config("controller.workers must be between 1 and 64".into()));
        }
        if !(1..=3600).contains(&self.resync_secs) {
            return Err(PolicyError::Config(
                "controller.resync_secs must be between 1 and 3600".into(),
            ));
        }
        if self.backoff_base_ms == 0 {
            return Err(PolicyError::Config("controller.backoff_base_ms must be > 0".into()));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(PolicyError::Config(
                "controller.backoff_max_ms must be >= backoff_base_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionSection {
    #[serde(default = "default_admission_path")]
    pub path: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Allow requests whose evaluation exceeds the deadline.
    #[serde(default)]
    pub fail_open: bool,
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            path: default_admission_path(),
            timeout_ms: default_timeout_ms(),
            fail_open: false,
        }
    }
}

impl AdmissionSection {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(PolicyError::Config("admission.path must start with '/'".into()));
        }
        if !(100..=30000).contains(&self.timeout_ms) {
            return Err(PolicyError::Config(
                "admission.timeout_ms must be between 100 and 30000".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_query")]
    pub query: String,

    /// Keep compiled programs keyed by source hash.
    #[serde(default)]
    pub cache: bool,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            query: default_query(),
            cache: false,
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl EngineSection {
    pub fn validate(&self) -> Result<()> {
        if !self.query.starts_with("data.") {
            return Err(PolicyError::Config("engine.query must start with 'data.'".into()));
        }
        if self.cache && self.cache_capacity == 0 {
            return Err(PolicyError::Config(
                "engine.cache_capacity must be > 0 when cache is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Kubernetes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,

    /// YAML manifest loaded into the memory store at startup.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

impl StoreSection {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Kubernetes && self.seed_path.is_some() {
            return Err(PolicyError::Config(
                "store.seed_path is only valid with the memory backend".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a listen address. A bare `:port` binds all interfaces.
pub fn parse_listen(s: &str) -> Result<SocketAddr> {
    let full = if s.starts_with(':') { format!("0.0.0.0{s}") } else { s.to_string() };
    full.parse()
        .map_err(|e| PolicyError::Config(format!("invalid listen address {s}: {e}")))
}

fn default_webhook_listen() -> String {
    "0.0.0.0:9443".into()
}
fn default_probe_listen() -> String {
    "0.0.0.0:8081".into()
}
fn default_metrics_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_cert_dir() -> PathBuf {
    PathBuf::from("/tmp/k8s-webhook-server/serving-certs")
}
fn default_true() -> bool {
    true
}
fn default_workers() -> usize {
    2
}
fn default_resync_secs() -> u64 {
    60
}
fn default_backoff_base_ms() -> u64 {
    5
}
fn default_backoff_max_ms() -> u64 {
    300_000
}
fn default_admission_path() -> String {
    "/validate-deployment".into()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_query() -> String {
    respol_core::ALLOW_QUERY.into()
}
fn default_cache_capacity() -> usize {
    256
}
