//! Shard registry with lookup-or-create
//!
//! Maps a [`ShardIdentity`] to a live shard. The registry is an ordinary
//! value: construct one per process (or per test) and share it as
//! `Arc<ShardRegistry>` with every handle site and operation layer.
//!
//! Holds the map lock for the whole lookup-or-create sequence so only one
//! thread constructs a shard for a given identity; the others observe the
//! shard it installed.
//!
//! Uses parking_lot::Mutex instead of std::sync::Mutex to avoid cascading
//! panics from mutex poisoning.

use parking_lot::Mutex;
use psshard_core::{Error, Result, ShardIdentity};
use psshard_storage::{PsShard, ShardRef};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Container used when neither the caller nor the config names one
pub const DEFAULT_CONTAINER: &str = "localhost";

/// Registry of live shards keyed by identity
pub struct ShardRegistry {
    default_container: String,
    shards: Mutex<HashMap<ShardIdentity, ShardRef>>,
    next_id: AtomicU64,
}

impl ShardRegistry {
    /// Create an empty registry
    pub fn new(default_container: impl Into<String>) -> Self {
        Self {
            default_container: default_container.into(),
            shards: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Container substituted for an empty container name
    pub fn default_container(&self) -> &str {
        &self.default_container
    }

    /// Unique id for generated private names
    pub fn next_unique_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Return the shard for `identity`, creating it with `factory` if absent
    ///
    /// The returned reference is a new `Arc`; drop it when done. If the
    /// factory fails nothing is installed and its error is returned.
    pub fn lookup_or_create<F>(&self, identity: &ShardIdentity, factory: F) -> Result<ShardRef>
    where
        F: FnOnce() -> Result<ShardRef>,
    {
        // Hold lock for entire operation to prevent TOCTOU race condition
        let mut shards = self.shards.lock();

        if let Some(shard) = shards.get(identity) {
            debug!(target: "psshard::registry", %identity, "Returning existing shard");
            return Ok(ShardRef::clone(shard));
        }

        let shard = factory()?;
        shards.insert(identity.clone(), ShardRef::clone(&shard));
        info!(
            target: "psshard::registry",
            %identity,
            key_dtype = %shard.key_dtype(),
            value_dtype = %shard.value_dtype(),
            "Created shard"
        );
        Ok(shard)
    }

    /// Return the shard for `identity`
    ///
    /// # Errors
    ///
    /// `NotFound` if no shard is registered under `identity`.
    pub fn lookup(&self, identity: &ShardIdentity) -> Result<ShardRef> {
        self.shards
            .lock()
            .get(identity)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Shard {} does not exist", identity)))
    }

    /// Remove `identity` from the registry
    ///
    /// The shard itself is freed once in-flight operations drop their
    /// references.
    ///
    /// # Errors
    ///
    /// `NotFound` if the identity is not registered.
    pub fn delete(&self, identity: &ShardIdentity) -> Result<()> {
        match self.shards.lock().remove(identity) {
            Some(_) => {
                info!(target: "psshard::registry", %identity, "Deleted shard");
                Ok(())
            }
            None => Err(Error::not_found(format!("Shard {} does not exist", identity))),
        }
    }

    /// Remove every shard in `container`, returning how many were removed
    pub fn cleanup(&self, container: &str) -> usize {
        let mut shards = self.shards.lock();
        let before = shards.len();
        shards.retain(|identity, _| identity.container != container);
        let removed = before - shards.len();
        info!(target: "psshard::registry", container, removed, "Cleaned up container");
        removed
    }

    /// Check if `identity` is registered
    pub fn contains(&self, identity: &ShardIdentity) -> bool {
        self.shards.lock().contains_key(identity)
    }

    /// Number of registered shards
    pub fn len(&self) -> usize {
        self.shards.lock().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.shards.lock().is_empty()
    }

    /// Registered identities, sorted
    pub fn identities(&self) -> Vec<ShardIdentity> {
        let mut ids: Vec<ShardIdentity> = self.shards.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ShardRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CONTAINER)
    }
}

impl fmt::Debug for ShardRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardRegistry")
            .field("default_container", &self.default_container)
            .field("shard_count", &self.len())
            .finish()
    }
}
