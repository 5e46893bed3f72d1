//! Allocation tracking for shard growth
//!
//! When `track_allocations` is enabled, handle sites report the footprint
//! of newly created shards and push/load report how much a batch changed
//! the shard's estimate. Deltas may be negative (a load that shrinks the
//! table).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Accumulates persistent memory deltas reported by shard operations
#[derive(Debug, Default)]
pub struct MemoryTracker {
    persistent_bytes: AtomicI64,
    records: AtomicU64,
}

impl MemoryTracker {
    /// Create a tracker with nothing recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a persistent allocation delta
    pub fn record_persistent(&self, bytes: i64) {
        self.persistent_bytes.fetch_add(bytes, Ordering::AcqRel);
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    /// Sum of all recorded deltas
    pub fn persistent_bytes(&self) -> i64 {
        self.persistent_bytes.load(Ordering::Acquire)
    }

    /// Number of deltas recorded
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }
}
