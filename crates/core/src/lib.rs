//! Core types for psshard
//!
//! This crate defines the foundational types used throughout the system:
//! - DType / TensorShape / Tensor: typed arrays exchanged with shard operations
//! - ShardIdentity: (container, name) pair naming a shard
//! - Error: error taxonomy shared by every crate

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod tensor;
pub mod types;

pub use error::{Error, Result};
pub use tensor::{DType, Element, Tensor, TensorData, TensorShape};
pub use types::ShardIdentity;
