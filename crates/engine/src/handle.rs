//! Shard handles and per-site handle caching
//!
//! A [`ShardHandle`] is the opaque value callers pass to every operation.
//! A [`HandleSite`] produces one: on its first call it resolves the site's
//! identity, creates or finds the shard through the registry and caches
//! the handle; later calls return the cached handle without touching the
//! registry.
//!
//! # Identity rules
//!
//! | container | shared_name | node-name sharing | identity                       | private |
//! |-----------|-------------|-------------------|--------------------------------|---------|
//! | empty     | -           | -                 | registry default container     | -       |
//! | -         | `s`         | -                 | name `s`                       | no      |
//! | -         | empty       | yes               | name = node name               | no      |
//! | -         | empty       | no                | name `_<unique id>_<node name>`| yes     |
//!
//! A private shard belongs to its site and is deleted from the registry
//! when the site is dropped.

use parking_lot::Mutex;
use psshard_core::{DType, Error, Result, ShardIdentity, Tensor};
use psshard_storage::{check_shard_dtypes, new_scalar_shard, PsShard};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::memory::MemoryTracker;
use crate::registry::ShardRegistry;

/// Opaque reference to a shard in a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardHandle {
    identity: ShardIdentity,
}

impl ShardHandle {
    /// Handle for `identity`
    pub fn new(identity: ShardIdentity) -> Self {
        Self { identity }
    }

    /// Identity this handle resolves
    pub fn identity(&self) -> &ShardIdentity {
        &self.identity
    }

    /// Reference form: string tensor `[container, name]`
    pub fn to_tensor(&self) -> Tensor {
        Tensor::from_strings([self.identity.container.as_str(), self.identity.name.as_str()])
    }

    /// Decode the reference form produced by [`to_tensor`](Self::to_tensor)
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `tensor` is a string tensor of exactly two
    /// elements.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let parts = tensor.flat_strings().map_err(|_| {
            Error::invalid_argument(format!(
                "Shard handle must be a string tensor, got {}",
                tensor.dtype()
            ))
        })?;
        match parts {
            [container, name] => Ok(Self::new(ShardIdentity::new(container.clone(), name.clone()))),
            _ => Err(Error::invalid_argument(format!(
                "Shard handle must have exactly 2 elements, but had shape: {}",
                tensor.shape()
            ))),
        }
    }
}

/// Construction options for a [`HandleSite`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSiteOptions {
    /// Name of the call site, used to derive shard names
    pub node_name: String,
    /// Key dtype of the shard
    pub key_dtype: DType,
    /// Value dtype of the shard
    pub value_dtype: DType,
    /// Container; empty selects the registry default
    pub container: String,
    /// Explicit shared shard name; empty derives one from the node name
    pub shared_name: String,
    /// Share the shard under the node name when no shared name is given
    pub use_node_name_sharing: bool,
}

impl HandleSiteOptions {
    /// Options for a private site in the default container
    pub fn new(node_name: impl Into<String>, key_dtype: DType, value_dtype: DType) -> Self {
        Self {
            node_name: node_name.into(),
            key_dtype,
            value_dtype,
            container: String::new(),
            shared_name: String::new(),
            use_node_name_sharing: false,
        }
    }

    /// Set the container
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    /// Set an explicit shared name
    pub fn with_shared_name(mut self, shared_name: impl Into<String>) -> Self {
        self.shared_name = shared_name.into();
        self
    }

    /// Share under the node name when no shared name is given
    pub fn with_node_name_sharing(mut self, enabled: bool) -> Self {
        self.use_node_name_sharing = enabled;
        self
    }
}

/// Resolved identity of a site
#[derive(Debug, Clone)]
struct ContainerInfo {
    identity: ShardIdentity,
    private_to_site: bool,
}

impl ContainerInfo {
    fn resolve(registry: &ShardRegistry, options: &HandleSiteOptions) -> Result<Self> {
        let container = if options.container.is_empty() {
            registry.default_container().to_string()
        } else {
            if !is_valid_container_name(&options.container) {
                return Err(Error::invalid_argument(format!(
                    "container contains invalid characters: {}",
                    options.container
                )));
            }
            options.container.clone()
        };

        if !options.shared_name.is_empty() {
            if options.shared_name.starts_with('_') {
                return Err(Error::invalid_argument(format!(
                    "shared_name cannot start with '_': {}",
                    options.shared_name
                )));
            }
            return Ok(Self {
                identity: ShardIdentity::new(container, options.shared_name.clone()),
                private_to_site: false,
            });
        }

        if options.use_node_name_sharing {
            return Ok(Self {
                identity: ShardIdentity::new(container, options.node_name.clone()),
                private_to_site: false,
            });
        }

        let name = format!("_{}_{}", registry.next_unique_id(), options.node_name);
        Ok(Self {
            identity: ShardIdentity::new(container, name),
            private_to_site: true,
        })
    }
}

/// `[A-Za-z0-9.][A-Za-z0-9_.\-/]*`
fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
}

#[derive(Debug, Default)]
struct SiteState {
    info: Option<ContainerInfo>,
    handle: Option<ShardHandle>,
}

/// Lazily resolves and caches the handle for one call site
#[derive(Debug)]
pub struct HandleSite {
    registry: Arc<ShardRegistry>,
    options: HandleSiteOptions,
    initial_capacity: usize,
    tracker: Option<Arc<MemoryTracker>>,
    state: Mutex<SiteState>,
}

impl HandleSite {
    /// Create an unresolved site
    ///
    /// `tracker`, when present, receives the footprint of a shard this site
    /// creates.
    pub fn new(
        registry: Arc<ShardRegistry>,
        options: HandleSiteOptions,
        initial_capacity: usize,
        tracker: Option<Arc<MemoryTracker>>,
    ) -> Self {
        debug!(target: "psshard::handle", node = %options.node_name, "Created handle site");
        Self {
            registry,
            options,
            initial_capacity,
            tracker,
            state: Mutex::new(SiteState::default()),
        }
    }

    /// Options this site was built with
    pub fn options(&self) -> &HandleSiteOptions {
        &self.options
    }

    /// Return the site's handle, creating or locating its shard on first use
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an invalid container or shared name, or when
    ///   an existing shard under the same identity has different dtypes
    /// - `Unsupported` when the dtype pair has no scalar shard
    ///
    /// A failed first call leaves the site unresolved; the next call
    /// retries.
    pub fn handle(&self) -> Result<ShardHandle> {
        let mut state = self.state.lock();
        if let Some(handle) = &state.handle {
            return Ok(handle.clone());
        }

        let info = match state.info.clone() {
            Some(info) => info,
            None => {
                let info = ContainerInfo::resolve(&self.registry, &self.options)?;
                state.info = Some(info.clone());
                info
            }
        };

        let mut created = false;
        let shard = self.registry.lookup_or_create(&info.identity, || {
            created = true;
            new_scalar_shard(
                self.options.key_dtype,
                self.options.value_dtype,
                self.initial_capacity,
            )
        })?;
        check_shard_dtypes(
            &*shard,
            self.options.key_dtype,
            self.options.value_dtype,
            &info.identity.name,
        )?;

        let handle = ShardHandle::new(info.identity.clone());
        if created {
            if let Some(tracker) = &self.tracker {
                let handle_bytes = handle.to_tensor().allocated_bytes() as i64;
                tracker.record_persistent(shard.memory_used() + handle_bytes);
            }
        }
        info!(
            target: "psshard::handle",
            identity = %info.identity,
            private = info.private_to_site,
            created,
            "Resolved shard handle"
        );

        state.handle = Some(handle.clone());
        Ok(handle)
    }

    /// True once a handle has been cached
    pub fn is_set(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    /// Identity the site resolved to, if resolved
    pub fn identity(&self) -> Option<ShardIdentity> {
        self.state.lock().handle.as_ref().map(|h| h.identity.clone())
    }

    /// True if the site's shard is private to it (known after first resolve)
    pub fn is_private(&self) -> bool {
        self.state
            .lock()
            .info
            .as_ref()
            .map(|info| info.private_to_site)
            .unwrap_or(false)
    }
}

impl Drop for HandleSite {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let (Some(handle), Some(info)) = (&state.handle, &state.info) else {
            return;
        };
        if !info.private_to_site {
            return;
        }
        // the shard may already be gone after a container cleanup
        match self.registry.delete(&handle.identity) {
            Ok(()) => {
                debug!(
                    target: "psshard::handle",
                    identity = %handle.identity,
                    "Deleted private shard"
                )
            }
            Err(e) if e.is_not_found() => {
                debug!(
                    target: "psshard::handle",
                    identity = %handle.identity,
                    "Private shard already removed"
                )
            }
            Err(e) => {
                warn!(
                    target: "psshard::handle",
                    identity = %handle.identity,
                    error = %e,
                    "Failed to delete private shard"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<ShardRegistry> {
        Arc::new(ShardRegistry::default())
    }

    fn site(registry: &Arc<ShardRegistry>, options: HandleSiteOptions) -> HandleSite {
        HandleSite::new(Arc::clone(registry), options, 0, None)
    }

    #[test]
    fn test_handle_tensor_round_trip() {
        let handle = ShardHandle::new(ShardIdentity::new("localhost", "emb"));
        let tensor = handle.to_tensor();
        assert_eq!(tensor.dtype(), DType::String);
        assert_eq!(tensor.num_elements(), 2);
        assert_eq!(ShardHandle::from_tensor(&tensor).unwrap(), handle);
    }

    #[test]
    fn test_malformed_handle_tensor() {
        let three = Tensor::from_strings(["a", "b", "c"]);
        assert!(ShardHandle::from_tensor(&three).unwrap_err().is_invalid_argument());
        let numeric = Tensor::from_vec(vec![1i64, 2]);
        assert!(ShardHandle::from_tensor(&numeric).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_private_site_generates_unique_name() {
        let registry = registry();
        let a = site(&registry, HandleSiteOptions::new("node", DType::Int64, DType::Float));
        let b = site(&registry, HandleSiteOptions::new("node", DType::Int64, DType::Float));

        let ha = a.handle().unwrap();
        let hb = b.handle().unwrap();
        assert_ne!(ha, hb);
        assert!(ha.identity().name.starts_with('_'));
        assert!(ha.identity().name.ends_with("_node"));
        assert_eq!(ha.identity().container, "localhost");
        assert!(a.is_private());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_handle_is_cached() {
        let registry = registry();
        let s = site(&registry, HandleSiteOptions::new("node", DType::Int64, DType::Float));
        assert!(!s.is_set());
        let first = s.handle().unwrap();
        assert!(s.is_set());

        // deleting behind the site's back does not make it re-resolve
        registry.delete(first.identity()).unwrap();
        let second = s.handle().unwrap();
        assert_eq!(first, second);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_node_name_sharing() {
        let registry = registry();
        let opts = HandleSiteOptions::new("shared_node", DType::Int32, DType::Int32)
            .with_node_name_sharing(true);
        let a = site(&registry, opts.clone());
        let b = site(&registry, opts);
        assert_eq!(a.handle().unwrap(), b.handle().unwrap());
        assert_eq!(a.identity().unwrap().name, "shared_node");
        assert!(!a.is_private());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_shared_name_and_container() {
        let registry = registry();
        let s = site(
            &registry,
            HandleSiteOptions::new("node", DType::Int64, DType::Double)
                .with_container("ps0")
                .with_shared_name("embeddings"),
        );
        let handle = s.handle().unwrap();
        assert_eq!(handle.identity(), &ShardIdentity::new("ps0", "embeddings"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let registry = registry();
        let bad_shared = site(
            &registry,
            HandleSiteOptions::new("n", DType::Int64, DType::Int64).with_shared_name("_hidden"),
        );
        assert!(bad_shared.handle().unwrap_err().is_invalid_argument());

        let bad_container = site(
            &registry,
            HandleSiteOptions::new("n", DType::Int64, DType::Int64).with_container("-x"),
        );
        assert!(bad_container.handle().unwrap_err().is_invalid_argument());
        assert!(!bad_container.is_set());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_container_name_rules() {
        assert!(is_valid_container_name("localhost"));
        assert!(is_valid_container_name(".a/b-c_d"));
        assert!(!is_valid_container_name(""));
        assert!(!is_valid_container_name("_x"));
        assert!(!is_valid_container_name("a b"));
    }

    #[test]
    fn test_dtype_conflict_rejected() {
        let registry = registry();
        let int_site = site(
            &registry,
            HandleSiteOptions::new("n", DType::Int64, DType::Int32).with_shared_name("t"),
        );
        int_site.handle().unwrap();

        let float_site = site(
            &registry,
            HandleSiteOptions::new("n", DType::Int64, DType::Float).with_shared_name("t"),
        );
        let err = float_site.handle().unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!float_site.is_set());

        let shard = registry.lookup(&ShardIdentity::new("localhost", "t")).unwrap();
        assert_eq!(shard.value_dtype(), DType::Int32);
    }

    #[test]
    fn test_unsupported_dtypes() {
        let registry = registry();
        let s = site(&registry, HandleSiteOptions::new("n", DType::Float, DType::Float));
        assert!(s.handle().unwrap_err().is_unsupported());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unreservable_capacity_is_an_error() {
        let registry = registry();
        let s = HandleSite::new(
            Arc::clone(&registry),
            HandleSiteOptions::new("n", DType::Int64, DType::Float).with_shared_name("big"),
            usize::MAX,
            None,
        );
        assert!(s.handle().unwrap_err().is_invalid_argument());
        assert!(!s.is_set());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_deletes_private_shard() {
        let registry = registry();
        let s = site(&registry, HandleSiteOptions::new("n", DType::Int64, DType::Float));
        s.handle().unwrap();
        assert_eq!(registry.len(), 1);
        drop(s);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_keeps_shared_shard() {
        let registry = registry();
        let s = site(
            &registry,
            HandleSiteOptions::new("n", DType::Int64, DType::Float).with_shared_name("keep"),
        );
        s.handle().unwrap();
        drop(s);
        assert!(registry.contains(&ShardIdentity::new("localhost", "keep")));
    }

    #[test]
    fn test_drop_tolerates_missing_shard() {
        let registry = registry();
        let s = site(&registry, HandleSiteOptions::new("n", DType::Int64, DType::Float));
        s.handle().unwrap();
        registry.cleanup("localhost");
        drop(s);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unresolved_drop_is_noop() {
        let registry = registry();
        registry
            .lookup_or_create(&ShardIdentity::new("localhost", "other"), || {
                new_scalar_shard(DType::Int64, DType::Int64, 0)
            })
            .unwrap();
        let s = site(&registry, HandleSiteOptions::new("n", DType::Int64, DType::Float));
        drop(s);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_creation_footprint_tracked() {
        let registry = registry();
        let tracker = Arc::new(MemoryTracker::new());
        let opts = HandleSiteOptions::new("n", DType::Int64, DType::Float).with_shared_name("t");
        let a = HandleSite::new(Arc::clone(&registry), opts.clone(), 0, Some(Arc::clone(&tracker)));
        a.handle().unwrap();
        assert!(tracker.persistent_bytes() > 0);
        assert_eq!(tracker.record_count(), 1);

        // a second site finding the same shard does not count it again
        let b = HandleSite::new(Arc::clone(&registry), opts, 0, Some(Arc::clone(&tracker)));
        b.handle().unwrap();
        assert_eq!(tracker.record_count(), 1);
    }
}
