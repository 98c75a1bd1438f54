//! RecipeStore: in-memory transactional record store
//!
//! This module implements the Storage trait using:
//! - `BTreeMap<RecordId, VersionedRecord>` for the records
//! - `BTreeMap<RecipeNumber, RecordId>` as a unique, ordered number index
//! - `parking_lot::RwLock<Arc<StoreState>>` for copy-on-write commits
//!
//! # Design Notes
//!
//! - **Snapshots are O(1)**: readers clone the `Arc`, never the maps
//! - **Commits are all-or-nothing**: a commit is checked against the current
//!   state first and only then applied, under the write lock
//! - **Unique constraint**: `apply` refuses to let two live records share a
//!   number, independent of any transaction-level validation above it

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use recipeseq_core::{RecipeRecord, RecordId, SnapshotView, Storage, StoreResult};

use crate::fault::FaultInjector;
use crate::snapshot::StoreSnapshot;
use crate::state::StoreState;

/// In-memory versioned store for recipe records
#[derive(Debug, Default)]
pub struct RecipeStore {
    state: RwLock<Arc<StoreState>>,
    faults: FaultInjector,
}

impl RecipeStore {
    /// Create an empty store at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store sharing the given fault injector
    pub fn with_faults(faults: FaultInjector) -> Self {
        Self {
            state: RwLock::new(Arc::new(StoreState::default())),
            faults,
        }
    }

    /// The fault injector wired into this store
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Take a typed snapshot of the committed state
    pub fn create_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::new(Arc::clone(&self.state.read()), Some(self.faults.clone()))
    }

    /// Snapshot that ignores injected read latency
    pub fn create_validation_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::new(Arc::clone(&self.state.read()), None)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for RecipeStore {
    fn snapshot(&self) -> Box<dyn SnapshotView> {
        Box::new(self.create_snapshot())
    }

    fn validation_snapshot(&self) -> Box<dyn SnapshotView> {
        Box::new(self.create_validation_snapshot())
    }

    fn current_version(&self) -> u64 {
        self.state.read().version
    }

    fn check(&self, version: u64, puts: &[RecipeRecord], deletes: &[RecordId]) -> StoreResult<()> {
        self.state.read().check(version, puts, deletes)
    }

    fn apply(&self, version: u64, puts: &[RecipeRecord], deletes: &[RecordId]) -> StoreResult<()> {
        let mut guard = self.state.write();
        guard.check(version, puts, deletes)?;
        // Copies the maps only while a snapshot still shares them.
        Arc::make_mut(&mut *guard).apply_unchecked(version, puts, deletes);
        debug!(
            target: "recipeseq::store",
            version,
            puts = puts.len(),
            deletes = deletes.len(),
            "Applied commit"
        );
        Ok(())
    }
}
