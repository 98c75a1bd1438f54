//! Snapshot views over the committed state
//!
//! # Design Notes
//!
//! - **Shared, not cloned**: A snapshot holds an `Arc` to the state that
//!   was current when it was taken; later commits build a new state
//! - **Immutable**: Once created, the snapshot never changes
//! - **Thread-safe**: Can be moved to and shared between threads

use std::ops::Bound;
use std::sync::Arc;

use recipeseq_core::{RecipeNumber, RecordId, SnapshotView, VersionedRecord};

use crate::fault::FaultInjector;
use crate::state::StoreState;

/// Point-in-time view of a `RecipeStore`
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    state: Arc<StoreState>,
    /// `None` for views that bypass injected faults
    faults: Option<FaultInjector>,
}

impl StoreSnapshot {
    pub(crate) fn new(state: Arc<StoreState>, faults: Option<FaultInjector>) -> Self {
        Self { state, faults }
    }

    fn on_read(&self) {
        if let Some(faults) = &self.faults {
            faults.on_read();
        }
    }
}

impl SnapshotView for StoreSnapshot {
    fn version(&self) -> u64 {
        self.state.version
    }

    fn get(&self, id: &RecordId) -> Option<VersionedRecord> {
        self.on_read();
        self.state.records.get(id).cloned()
    }

    fn id_for(&self, number: RecipeNumber) -> Option<RecordId> {
        self.on_read();
        self.state.by_number.get(&number).copied()
    }

    fn range(&self, start: RecipeNumber, end: Option<RecipeNumber>) -> Vec<(RecipeNumber, RecordId)> {
        self.on_read();
        let upper = match end {
            Some(end) if end < start => return Vec::new(),
            Some(end) => Bound::Included(end),
            None => Bound::Unbounded,
        };
        self.state
            .by_number
            .range((Bound::Included(start), upper))
            .map(|(n, id)| (*n, *id))
            .collect()
    }

    fn max_entry(&self) -> Option<(RecipeNumber, RecordId)> {
        self.on_read();
        self.state
            .by_number
            .iter()
            .next_back()
            .map(|(n, id)| (*n, *id))
    }

    fn len(&self) -> usize {
        self.state.records.len()
    }
}
