//! psshard - embedded parameter-shard storage engine
//!
//! A registry of concurrently accessed scalar key-value shards addressed
//! through opaque handles, with bulk pull/push, full-snapshot load/save and
//! memory accounting.
//!
//! # Quick Start
//!
//! ```
//! use psshard::{DType, HandleSiteOptions, ParamServer, PsConfig, Tensor};
//!
//! let server = ParamServer::new(PsConfig::default())?;
//! let site = server.handle_site(HandleSiteOptions::new("emb", DType::Int64, DType::Float));
//! let handle = site.handle()?;
//!
//! server.push(&handle, &Tensor::from_vec(vec![10i64, 20]), &Tensor::from_vec(vec![1.0f32, 2.0]))?;
//! let values = server.pull(&handle, &Tensor::from_vec(vec![20i64, 99]), &Tensor::scalar(0.0f32))?;
//! assert_eq!(values.flat::<f32>()?, &[2.0, 0.0]);
//! # Ok::<(), psshard::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `psshard-core`: tensors, dtypes, identities, errors
//! - `psshard-storage`: per-shard tables and the `PsShard` capability
//! - `psshard-engine`: registry, handle sites, operations, config, logging

pub use psshard_core::{DType, Element, Error, Result, ShardIdentity, Tensor, TensorShape};
pub use psshard_engine::*;
pub use psshard_storage::{PsShard, ShardRef, SUPPORTED_DTYPE_PAIRS};
