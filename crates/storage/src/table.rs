//! Scalar key-value table
//!
//! One `Table<K, V>` per shard, holding an FxHashMap behind a
//! `parking_lot::RwLock`.
//!
//! # Locking
//!
//! - `find()`, `size()`, `export_all()`, `memory_estimate()`: shared lock,
//!   any number of readers proceed together
//! - `insert()`, `remove()`: exclusive lock, serialized against readers and
//!   other writers
//!
//! A batch insert holds the write lock for the whole batch, including the
//! optional clear, so readers never observe a half-applied batch.

use parking_lot::RwLock;
use psshard_core::{Element, Error, Result};
use rustc_hash::FxHashMap;
use std::hash::Hash;
use tracing::trace;

/// Element types usable as table keys
pub trait ScalarKey: Element + Eq + Hash {}

impl ScalarKey for i32 {}
impl ScalarKey for i64 {}

/// Thread-safe mapping from scalar key to scalar value
#[derive(Debug)]
pub struct Table<K, V> {
    data: RwLock<FxHashMap<K, V>>,
}

impl<K: ScalarKey, V: Element> Table<K, V> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            data: RwLock::new(FxHashMap::default()),
        }
    }

    /// Create a table with pre-allocated capacity
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `capacity` entries cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut data: FxHashMap<K, V> = FxHashMap::default();
        data.try_reserve(capacity).map_err(|e| {
            Error::invalid_argument(format!("Cannot reserve {} table entries: {}", capacity, e))
        })?;
        Ok(Self {
            data: RwLock::new(data),
        })
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Look up every key, falling back to a default for absent keys
    ///
    /// If `defaults` has one entry per key, the i-th default belongs to the
    /// i-th key. Otherwise every absent key gets `defaults[0]`. Absent keys
    /// are not inserted.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `keys` is non-empty and `defaults` is empty.
    pub fn find(&self, keys: &[K], defaults: &[V]) -> Result<Vec<V>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let shared_default = *defaults.first().ok_or_else(|| {
            Error::invalid_argument(format!(
                "Lookup of {} keys requires at least one default value",
                keys.len()
            ))
        })?;
        let per_key = defaults.len() == keys.len();

        let data = self.data.read();
        let out = keys
            .iter()
            .enumerate()
            .map(|(i, key)| match data.get(key) {
                Some(value) => *value,
                None if per_key => defaults[i],
                None => shared_default,
            })
            .collect();
        trace!(target: "psshard::table", keys = keys.len(), "find");
        Ok(out)
    }

    /// Insert or overwrite every pair, in input order
    ///
    /// With `clear_first` the table is emptied inside the same critical
    /// section, which gives snapshot-replace semantics. Later duplicates of
    /// a key within `keys` win.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `keys` and `values` differ in length. Nothing is
    /// cleared or written in that case.
    pub fn insert(&self, keys: &[K], values: &[V], clear_first: bool) -> Result<()> {
        if keys.len() != values.len() {
            return Err(Error::invalid_argument(format!(
                "Expected {} values for {} keys, got {}",
                keys.len(),
                keys.len(),
                values.len()
            )));
        }

        let mut data = self.data.write();
        if clear_first {
            data.clear();
        }
        data.reserve(keys.len());
        for (key, value) in keys.iter().zip(values) {
            data.insert(*key, *value);
        }
        trace!(
            target: "psshard::table",
            keys = keys.len(),
            clear_first,
            size = data.len(),
            "insert"
        );
        Ok(())
    }

    /// Remove keys
    ///
    /// Currently a stub: succeeds without removing anything.
    pub fn remove(&self, keys: &[K]) -> Result<()> {
        let _data = self.data.write();
        trace!(target: "psshard::table", keys = keys.len(), "remove (no-op)");
        Ok(())
    }

    /// Every current entry as parallel key/value vectors
    pub fn export_all(&self) -> (Vec<K>, Vec<V>) {
        let data = self.data.read();
        let mut keys = Vec::with_capacity(data.len());
        let mut values = Vec::with_capacity(data.len());
        for (key, value) in data.iter() {
            keys.push(*key);
            values.push(*value);
        }
        (keys, values)
    }

    /// Approximate footprint
    ///
    /// Counts one unit per hash slot, empty or occupied, plus the struct
    /// itself. A heuristic for allocation tracking, not exact byte
    /// accounting.
    pub fn memory_estimate(&self) -> i64 {
        let data = self.data.read();
        let slots = data.capacity().max(data.len());
        (std::mem::size_of::<Self>() + slots) as i64
    }
}

impl<K: ScalarKey, V: Element> Default for Table<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
