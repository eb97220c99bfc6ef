//! Data-source configuration.
//!
//! Data sources are declared in a TOML file, one table per source:
//!
//! ```toml
//! [sources.warehouse]
//! type = "sybase"
//!
//! [sources.warehouse.options]
//! server = "ase.internal"
//! db = "pubs2"
//! user = "reporting"
//! ```
//!
//! Options are passed through untouched and validated against the runner's
//! configuration schema when the runner is created.

use crate::error::{Result, RunnerError};
use crate::runner::{Registry, SqlRunner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Contents of a data-source file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    /// Named data sources.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

/// One named data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Runner type identifier, e.g. `sybase`.
    #[serde(rename = "type")]
    pub runner_type: String,

    /// Raw runner options.
    #[serde(default)]
    pub options: toml::Table,
}

impl SourceConfig {
    /// The options as a JSON object, ready for schema validation.
    pub fn options_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.options)
            .map_err(|e| RunnerError::configuration(format!("Invalid options: {e}")))
    }

    /// Validates the options and builds a runner from `registry`.
    pub fn create_runner(&self, registry: &Registry) -> Result<SqlRunner> {
        registry.create(&self.runner_type, self.options_json()?)
    }
}

impl SourcesConfig {
    /// Returns the default data-source file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("query-runner")
            .join("sources.toml")
    }

    /// Loads data sources from a TOML file. A missing file yields no sources.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::configuration(format!("Failed to read {}: {e}", path.display()))
        })?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            RunnerError::configuration(format!("Invalid data-source file {}:\n  {}", path.display(), e))
        })
    }

    /// Looks up a data source by name.
    pub fn get_source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .get(name)
            .ok_or_else(|| RunnerError::configuration(format!("data source '{name}' not found")))
    }
}
