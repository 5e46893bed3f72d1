//! Core identity types
//!
//! - ShardIdentity: (container, name) pair naming one shard in a registry

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a shard within a registry
///
/// Two handles carrying equal identities resolve to the same shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardIdentity {
    /// Container (namespace) the shard lives in
    pub container: String,
    /// Name of the shard within its container
    pub name: String,
}

impl ShardIdentity {
    /// Create a new identity
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Container part
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Name part
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ShardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}
