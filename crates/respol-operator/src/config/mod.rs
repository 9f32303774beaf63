//! Operator config loader (strict parsing).

pub mod schema;

use std::fs;

use respol_core::error::{PolicyError, Result};

pub use schema::{
    parse_listen, AdmissionSection, ControllerSection, EngineSection, OperatorConfig, OperatorSection, StoreBackend,
    StoreSection,
};

pub fn load_from_file(path: &str) -> Result<OperatorConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PolicyError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<OperatorConfig> {
    let cfg: OperatorConfig = serde_yaml::from_str(s)
        .map_err(|e| PolicyError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
