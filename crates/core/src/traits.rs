//! Storage and snapshot abstractions
//!
//! These traits are the seam between the numbering engine and whatever
//! transactional store backs it. The engine only needs point lookups by
//! id, ordered range scans over the number index, and an atomic
//! multi-record apply.

use crate::error::StoreResult;
use crate::types::{RecipeNumber, RecipeRecord, RecordId, VersionedRecord};

/// Point-in-time read view of the store
///
/// A snapshot never changes after it is taken. Transactions read through
/// one and validate what they saw against the live store at commit.
///
/// Thread safety: Must be safe to pass between threads (Send + Sync).
pub trait SnapshotView: Send + Sync {
    /// Commit version this snapshot was taken at
    fn version(&self) -> u64;

    /// Look up a record by id
    fn get(&self, id: &RecordId) -> Option<VersionedRecord>;

    /// The id holding `number`, if any
    fn id_for(&self, number: RecipeNumber) -> Option<RecordId>;

    /// Ordered `(number, id)` pairs with `start <= number <= end`
    ///
    /// `end = None` means unbounded.
    fn range(&self, start: RecipeNumber, end: Option<RecipeNumber>) -> Vec<(RecipeNumber, RecordId)>;

    /// The highest-numbered entry, if the store holds any records
    fn max_entry(&self) -> Option<(RecipeNumber, RecordId)>;

    /// Number of live records
    fn len(&self) -> usize;

    /// Whether the store holds no records
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transactional record store
///
/// Thread safety: All methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait Storage: Send + Sync {
    /// Take a snapshot of the committed state
    fn snapshot(&self) -> Box<dyn SnapshotView>;

    /// Snapshot used by the commit path to validate reads
    ///
    /// Taken under the commit lock. Stores that instrument ordinary reads
    /// (latency, tracing) should return an uninstrumented view here.
    fn validation_snapshot(&self) -> Box<dyn SnapshotView> {
        self.snapshot()
    }

    /// Current commit version
    fn current_version(&self) -> u64;

    /// Check a commit against the current state without applying it
    ///
    /// Used by the commit path to reject a write set before it is logged.
    ///
    /// # Errors
    ///
    /// Same as `apply`.
    fn check(&self, version: u64, puts: &[RecipeRecord], deletes: &[RecordId]) -> StoreResult<()>;

    /// Apply one commit atomically
    ///
    /// Either every put and delete becomes visible at `version`, or none
    /// do. Implementations must reject a put whose number is held by a
    /// record that is neither rewritten nor deleted by the same commit.
    ///
    /// # Errors
    ///
    /// Returns `UniqueViolation`, `ReservedNumber` or `StaleVersion`; the
    /// store is unchanged in every error case.
    fn apply(&self, version: u64, puts: &[RecipeRecord], deletes: &[RecordId]) -> StoreResult<()>;
}
