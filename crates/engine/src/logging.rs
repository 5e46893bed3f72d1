//! Logging setup
//!
//! Components log through `tracing` under these targets:
//! `psshard::registry`, `psshard::handle`, `psshard::ops`, `psshard::table`.

use psshard_core::{Error, Result};
use tracing_subscriber::EnvFilter;

use crate::config::PsConfig;

/// Install a fmt subscriber filtered by `config.log_filter`
///
/// Embedders that install their own subscriber can skip this. Calling it
/// when a global subscriber already exists is a no-op.
pub fn init_logging(config: &PsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_filter).map_err(|e| {
        Error::invalid_argument(format!("Invalid log_filter '{}': {}", config.log_filter, e))
    })?;
    // try_init fails only when a global subscriber is already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
    Ok(())
}
