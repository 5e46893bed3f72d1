//! Shard operations: pull, push, load, save, remove
//!
//! [`ParamServer`] is the entry point. Each call resolves its handle to a
//! live shard through the registry, holds that reference for the duration
//! of the call and releases it on every return path, including errors.
//!
//! Validation always precedes mutation. In particular `load` checks the
//! whole batch before the table is cleared, so a rejected load leaves the
//! previous snapshot intact.

use psshard_core::{DType, Result, Tensor};
use psshard_storage::{check_shard_dtypes, PsShard, ShardRef};
use std::sync::Arc;
use tracing::debug;

use crate::config::PsConfig;
use crate::handle::{HandleSite, HandleSiteOptions, ShardHandle};
use crate::memory::MemoryTracker;
use crate::registry::ShardRegistry;

/// Parameter-server front end over a shard registry
#[derive(Debug)]
pub struct ParamServer {
    registry: Arc<ShardRegistry>,
    config: PsConfig,
    tracker: Option<Arc<MemoryTracker>>,
}

impl ParamServer {
    /// Create a server with a fresh registry
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `config` fails validation.
    pub fn new(config: PsConfig) -> Result<Self> {
        let registry = Arc::new(ShardRegistry::new(config.default_container.clone()));
        Self::with_registry(config, registry)
    }

    /// Create a server over an existing registry
    ///
    /// The registry's own default container applies to handle sites.
    pub fn with_registry(config: PsConfig, registry: Arc<ShardRegistry>) -> Result<Self> {
        config.validate()?;
        let tracker = config
            .track_allocations
            .then(|| Arc::new(MemoryTracker::new()));
        Ok(Self {
            registry,
            config,
            tracker,
        })
    }

    /// Registry backing this server
    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &PsConfig {
        &self.config
    }

    /// Memory tracker, present when `track_allocations` is enabled
    pub fn memory_tracker(&self) -> Option<&Arc<MemoryTracker>> {
        self.tracker.as_ref()
    }

    /// New call site producing handles into this server's registry
    pub fn handle_site(&self, options: HandleSiteOptions) -> HandleSite {
        HandleSite::new(
            Arc::clone(&self.registry),
            options,
            self.config.initial_capacity,
            self.tracker.clone(),
        )
    }

    fn resolve(&self, handle: &ShardHandle) -> Result<ShardRef> {
        self.registry.lookup(handle.identity())
    }

    /// Look up `keys`, using `defaults` for absent keys
    ///
    /// One default per key pairs them positionally; otherwise `defaults[0]`
    /// serves every absent key. Never inserts.
    pub fn pull(&self, handle: &ShardHandle, keys: &Tensor, defaults: &Tensor) -> Result<Tensor> {
        let shard = self.resolve(handle)?;
        let values = shard.find(keys, defaults)?;
        debug!(
            target: "psshard::ops",
            identity = %handle.identity(),
            keys = keys.num_elements(),
            "pull"
        );
        Ok(values)
    }

    /// Validated lookup: `default` must be a single value or one per key
    pub fn add_meta(
        &self,
        handle: &ShardHandle,
        keys: &Tensor,
        default: &Tensor,
    ) -> Result<Tensor> {
        let shard = self.resolve(handle)?;
        shard.check_find_arguments(keys, default)?;
        let values = shard.find(keys, default)?;
        debug!(
            target: "psshard::ops",
            identity = %handle.identity(),
            keys = keys.num_elements(),
            "add_meta"
        );
        Ok(values)
    }

    /// Insert or overwrite pairs; later duplicates in the batch win
    pub fn push(&self, handle: &ShardHandle, keys: &Tensor, values: &Tensor) -> Result<()> {
        let shard = self.resolve(handle)?;
        shard.check_key_and_value(keys, values)?;
        self.tracked(&shard, || shard.insert(keys, values))?;
        debug!(
            target: "psshard::ops",
            identity = %handle.identity(),
            keys = keys.num_elements(),
            "push"
        );
        Ok(())
    }

    /// Replace the shard's whole content with the given pairs
    pub fn load(&self, handle: &ShardHandle, keys: &Tensor, values: &Tensor) -> Result<()> {
        let shard = self.resolve(handle)?;
        shard.check_key_and_value(keys, values)?;
        self.tracked(&shard, || shard.import_values(keys, values))?;
        debug!(
            target: "psshard::ops",
            identity = %handle.identity(),
            keys = keys.num_elements(),
            "load"
        );
        Ok(())
    }

    /// Export every entry as 1-D `(keys, values)`
    ///
    /// The result is accepted unchanged by [`load`](Self::load).
    pub fn save(&self, handle: &ShardHandle) -> Result<(Tensor, Tensor)> {
        let shard = self.resolve(handle)?;
        let exported = shard.export_values()?;
        debug!(
            target: "psshard::ops",
            identity = %handle.identity(),
            entries = exported.0.num_elements(),
            "save"
        );
        Ok(exported)
    }

    /// [`save`](Self::save) for a caller that expects specific dtypes
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the shard was created with a different
    /// key/value dtype pair.
    pub fn save_typed(
        &self,
        handle: &ShardHandle,
        key_dtype: DType,
        value_dtype: DType,
    ) -> Result<(Tensor, Tensor)> {
        let shard = self.resolve(handle)?;
        check_shard_dtypes(&*shard, key_dtype, value_dtype, &handle.identity().name)?;
        let exported = shard.export_values()?;
        debug!(
            target: "psshard::ops",
            identity = %handle.identity(),
            entries = exported.0.num_elements(),
            "save_typed"
        );
        Ok(exported)
    }

    /// Remove keys
    ///
    /// Validates the keys, then succeeds without removing anything.
    pub fn remove(&self, handle: &ShardHandle, keys: &Tensor) -> Result<()> {
        let shard = self.resolve(handle)?;
        shard.check_key(keys)?;
        shard.remove(keys)?;
        debug!(
            target: "psshard::ops",
            identity = %handle.identity(),
            keys = keys.num_elements(),
            "remove"
        );
        Ok(())
    }

    /// Number of entries in the shard
    pub fn size(&self, handle: &ShardHandle) -> Result<usize> {
        Ok(self.resolve(handle)?.size())
    }

    /// Memory estimate of the shard
    pub fn memory_used(&self, handle: &ShardHandle) -> Result<i64> {
        Ok(self.resolve(handle)?.memory_used())
    }

    /// Run a mutation, reporting the shard's memory delta when tracking
    fn tracked<F>(&self, shard: &ShardRef, mutate: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        match &self.tracker {
            Some(tracker) => {
                let before = shard.memory_used();
                mutate()?;
                tracker.record_persistent(shard.memory_used() - before);
                Ok(())
            }
            None => mutate(),
        }
    }
}
