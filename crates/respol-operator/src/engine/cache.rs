//! Compiled program cache.
//!
//! Compilation is pure given the source text, so programs are keyed by the
//! SHA-256 of the source alone. Each evaluation gets its own clone of the
//! prepared interpreter; the cached copy never sees an input.

use std::sync::Arc;

use dashmap::DashMap;
use regorus::Engine;
use sha2::{Digest, Sha256};

use respol_core::error::Result;

use crate::obs::OperatorMetrics;

pub struct ProgramCache {
    capacity: usize,
    programs: DashMap<[u8; 32], Engine>,
    metrics: Arc<OperatorMetrics>,
}

impl ProgramCache {
    pub fn new(capacity: usize, metrics: Arc<OperatorMetrics>) -> Self {
        Self {
            capacity: capacity.max(1),
            programs: DashMap::new(),
            metrics,
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Return a fresh copy of the compiled program, compiling on miss.
    /// Compile errors are not cached.
    pub fn get_or_compile(&self, source: &str, compile: impl FnOnce(&str) -> Result<Engine>) -> Result<Engine> {
        let key: [u8; 32] = Sha256::digest(source.as_bytes()).into();

        if let Some(hit) = self.programs.get(&key) {
            self.metrics.engine_cache.inc(&[("result", "hit")]);
            return Ok(hit.value().clone());
        }
        self.metrics.engine_cache.inc(&[("result", "miss")]);

        let engine = compile(source)?;
        if self.programs.len() >= self.capacity {
            // Full reset.
            tracing::debug!(capacity = self.capacity, "program cache full, clearing");
            self.programs.clear();
        }
        self.programs.insert(key, engine.clone());
        Ok(engine)
    }
}
