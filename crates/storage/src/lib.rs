//! Storage layer for psshard
//!
//! This crate implements the per-shard storage:
//! - Table: FxHashMap behind a parking_lot RwLock, one per shard
//! - PsShard: object-safe capability interface with shape/dtype validation
//! - ShardOfScalars: the generic scalar-to-scalar shard
//! - new_scalar_shard: runtime dtype pair -> concrete shard
//!
//! # Concurrency
//!
//! Reads (`find`, `size`, `export_values`, `memory_used`) share the table
//! lock; `insert`, `import_values` and `remove` take it exclusively.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod shard;
pub mod table;

pub use shard::{
    check_shard_dtypes, new_scalar_shard, PsShard, ShardOfScalars, ShardRef,
    SUPPORTED_DTYPE_PAIRS,
};
pub use table::{ScalarKey, Table};
