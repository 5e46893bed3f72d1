//! Engine layer for psshard
//!
//! Ties shards to identities and exposes the operation surface:
//! - ShardRegistry: identity -> shard, with atomic lookup-or-create
//! - HandleSite / ShardHandle: per-site lazy handle resolution
//! - ParamServer: pull / push / load / save / remove against a handle
//! - MemoryTracker: receives shard memory deltas when tracking is enabled
//! - PsConfig / init_logging: configuration file and log setup

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod handle;
pub mod logging;
pub mod memory;
pub mod ops;
pub mod registry;

pub use config::{PsConfig, CONFIG_FILE_NAME, MAX_INITIAL_CAPACITY};
pub use handle::{HandleSite, HandleSiteOptions, ShardHandle};
pub use logging::init_logging;
pub use memory::MemoryTracker;
pub use ops::ParamServer;
pub use registry::{ShardRegistry, DEFAULT_CONTAINER};
