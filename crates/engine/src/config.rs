//! Parameter-server configuration via `psshard.toml`
//!
//! Every field has a default, so an empty file (or no file) yields a
//! working configuration.

use psshard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::registry::DEFAULT_CONTAINER;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "psshard.toml";

/// Largest accepted `initial_capacity`.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 28;

/// Parameter-server configuration loaded from `psshard.toml`.
///
/// # Example
///
/// ```toml
/// default_container = "localhost"
/// track_allocations = false
/// initial_capacity = 0
/// log_filter = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsConfig {
    /// Container used for identities whose container is left empty.
    #[serde(default = "default_container")]
    pub default_container: String,
    /// Report shard memory growth to the memory tracker.
    #[serde(default)]
    pub track_allocations: bool,
    /// Entries pre-allocated in every newly created table.
    #[serde(default)]
    pub initial_capacity: usize,
    /// `tracing` filter directive used by `init_logging`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for PsConfig {
    fn default() -> Self {
        Self {
            default_container: default_container(),
            track_allocations: false,
            initial_capacity: 0,
            log_filter: default_log_filter(),
        }
    }
}

impl PsConfig {
    /// Check field values.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty `default_container`, an
    /// `initial_capacity` above [`MAX_INITIAL_CAPACITY`], or a `log_filter`
    /// that is not a valid filter directive.
    pub fn validate(&self) -> Result<()> {
        if self.default_container.is_empty() {
            return Err(Error::invalid_argument("default_container must not be empty"));
        }
        if self.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(Error::invalid_argument(format!(
                "initial_capacity {} exceeds the maximum of {}",
                self.initial_capacity, MAX_INITIAL_CAPACITY
            )));
        }
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            Error::invalid_argument(format!("Invalid log_filter '{}': {}", self.log_filter, e))
        })?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# psshard configuration

# Container used when a handle site does not name one.
default_container = "localhost"

# Report shard memory growth (creation, push, load) to the memory tracker.
track_allocations = false

# Entries pre-allocated in every newly created table.
initial_capacity = 0

# Log filter, e.g. "info" or "psshard::registry=debug,info".
log_filter = "info"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be read or parsed, `InvalidArgument` if
    /// a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: PsConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
