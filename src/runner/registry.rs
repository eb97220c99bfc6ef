//! Runner registry keyed by type identifier.

use super::{Backend, SqlRunner};
use crate::backends::{SqliteBackend, SybaseBackend};
use crate::error::{Result, RunnerError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The set of usable backends.
///
/// Backends whose driver is unavailable are never registered, so they can
/// not be instantiated and fail at first use.
#[derive(Default)]
pub struct Registry {
    backends: BTreeMap<&'static str, Arc<dyn Backend>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in backend that is enabled here.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SybaseBackend::new()));
        registry.register(Arc::new(SqliteBackend::new()));
        registry
    }

    /// Registers a backend if it is enabled. Returns whether it was registered.
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> bool {
        if !backend.is_enabled() {
            debug!(
                "{} query runner is not enabled; driver unavailable",
                backend.name()
            );
            return false;
        }

        info!("Registering {} ({}) query runner", backend.name(), backend.type_identifier());
        self.backends.insert(backend.type_identifier(), backend);
        true
    }

    pub fn get(&self, type_identifier: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(type_identifier)
    }

    pub fn contains(&self, type_identifier: &str) -> bool {
        self.backends.contains_key(type_identifier)
    }

    /// Registered backends, ordered by type identifier.
    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn Backend>> {
        self.backends.values()
    }

    /// Validates `options` against the backend's schema and builds a runner.
    ///
    /// Nothing touches the backend until the returned runner is used.
    pub fn create(&self, type_identifier: &str, options: serde_json::Value) -> Result<SqlRunner> {
        let backend = self.get(type_identifier).ok_or_else(|| {
            RunnerError::configuration(format!(
                "unknown or disabled query runner type '{type_identifier}'"
            ))
        })?;

        let configuration = backend.configuration_schema().validate(options)?;
        Ok(SqlRunner::new(Arc::clone(backend), configuration))
    }
}
