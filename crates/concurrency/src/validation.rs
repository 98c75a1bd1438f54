//! Transaction validation for OCC
//!
//! Key rules:
//! - First-committer-wins based on what the transaction READ
//! - A point read conflicts if the record's version changed (or it
//!   appeared/disappeared)
//! - A range read conflicts if re-running it against the live store
//!   returns different `(number, id)` pairs
//!
//! Because every numbering transaction reads the whole range it writes
//! into, these two checks serialise creates and deletes that touch the same
//! part of the number line.

use std::fmt;

use recipeseq_core::{RecipeNumber, RecordId, SnapshotView};

use crate::transaction::{RangeRead, TransactionContext};

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A record read by the transaction has since been rewritten or removed
    ReadWriteConflict {
        /// The record that changed
        id: RecordId,
        /// Version recorded when read (0 = absent)
        read_version: u64,
        /// Version now in the store (0 = absent)
        current_version: u64,
    },

    /// A range of the number index now holds different records
    RangeConflict {
        /// Inclusive lower bound of the range
        start: RecipeNumber,
        /// Inclusive upper bound, `None` for unbounded
        end: Option<RecipeNumber>,
        /// Entries seen when read
        observed: usize,
        /// Entries present now
        current: usize,
    },

    /// Conflict forced by the fault injector
    Injected,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                id,
                read_version,
                current_version,
            } => write!(
                f,
                "record {} changed (read v{}, now v{})",
                id, read_version, current_version
            ),
            ConflictType::RangeConflict {
                start,
                end,
                observed,
                current,
            } => match end {
                Some(end) => write!(
                    f,
                    "range {}..={} changed ({} -> {} entries)",
                    start, end, observed, current
                ),
                None => write!(
                    f,
                    "range {}.. changed ({} -> {} entries)",
                    start, observed, current
                ),
            },
            ConflictType::Injected => write!(f, "injected conflict"),
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        Self::default()
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.conflicts.first() {
            None => write!(f, "no conflicts"),
            Some(first) if self.conflicts.len() == 1 => write!(f, "{}", first),
            Some(first) => write!(f, "{} (+{} more)", first, self.conflicts.len() - 1),
        }
    }
}

/// Validate point reads against the live store
pub fn validate_read_set<'a>(
    read_set: impl IntoIterator<Item = (&'a RecordId, &'a u64)>,
    current: &dyn SnapshotView,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (id, &read_version) in read_set {
        let current_version = current.get(id).map_or(0, |v| v.version);
        if current_version != read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                id: *id,
                read_version,
                current_version,
            });
        }
    }
    result
}

/// Validate range reads against the live store
pub fn validate_range_reads(ranges: &[RangeRead], current: &dyn SnapshotView) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for range in ranges {
        let now = current.range(range.start, range.end);
        if now != range.observed {
            result.conflicts.push(ConflictType::RangeConflict {
                start: range.start,
                end: range.end,
                observed: range.observed.len(),
                current: now.len(),
            });
        }
    }
    result
}

/// Validate everything a transaction read
///
/// `current` must be a view of the latest committed state, taken while the
/// commit lock is held.
pub fn validate_transaction(
    txn: &TransactionContext,
    current: &dyn SnapshotView,
) -> ValidationResult {
    let mut result = validate_read_set(txn.read_set.iter(), current);
    result.merge(validate_range_reads(&txn.range_reads, current));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipeseq_core::{RecipeRecord, Storage};
    use recipeseq_storage::RecipeStore;
    use serde_json::json;

    fn record(n: u64) -> RecipeRecord {
        RecipeRecord::new(RecipeNumber::new(n), "author".into(), json!({}))
    }

    fn begin(store: &RecipeStore) -> TransactionContext {
        TransactionContext::new(1, store.snapshot(), None)
    }

    #[test]
    fn test_unchanged_reads_validate() {
        let store = RecipeStore::new();
        let r = record(6);
        store.apply(1, &[r.clone()], &[]).unwrap();

        let mut txn = begin(&store);
        txn.get(&r.id).unwrap();
        txn.max_number().unwrap();
        assert!(validate_transaction(&txn, store.snapshot().as_ref()).is_valid());
    }

    #[test]
    fn test_point_read_conflict() {
        let store = RecipeStore::new();
        let r = record(6);
        store.apply(1, &[r.clone()], &[]).unwrap();

        let mut txn = begin(&store);
        txn.get(&r.id).unwrap();
        store.apply(2, &[r.clone()], &[]).unwrap();

        let result = validate_transaction(&txn, store.snapshot().as_ref());
        assert_eq!(
            result.conflicts,
            vec![ConflictType::ReadWriteConflict {
                id: r.id,
                read_version: 1,
                current_version: 2,
            }]
        );
    }

    #[test]
    fn test_phantom_insert_is_range_conflict() {
        let store = RecipeStore::new();
        store.apply(1, &[record(6)], &[]).unwrap();

        let mut txn = begin(&store);
        assert_eq!(txn.max_number().unwrap(), Some(RecipeNumber::new(6)));
        // Another writer allocates 7 first
        store.apply(2, &[record(7)], &[]).unwrap();

        let result = validate_transaction(&txn, store.snapshot().as_ref());
        assert!(!result.is_valid());
        assert!(matches!(
            result.conflicts[0],
            ConflictType::RangeConflict {
                observed: 1,
                current: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_insert_into_empty_store_conflicts() {
        let store = RecipeStore::new();
        let mut a = begin(&store);
        assert_eq!(a.max_number().unwrap(), None);
        store.apply(1, &[record(6)], &[]).unwrap();
        assert!(!validate_transaction(&a, store.snapshot().as_ref()).is_valid());
    }

    #[test]
    fn test_write_below_read_range_does_not_conflict() {
        let store = RecipeStore::new();
        let low = record(6);
        store.apply(1, &[low.clone(), record(9)], &[]).unwrap();

        let mut txn = begin(&store);
        txn.scan(RecipeNumber::new(9), None).unwrap();
        // Payload-only rewrite of a record outside the range
        store.apply(2, &[low], &[]).unwrap();

        assert!(validate_transaction(&txn, store.snapshot().as_ref()).is_valid());
    }

    #[test]
    fn test_display_summarises() {
        let mut result = ValidationResult::conflict(ConflictType::Injected);
        assert_eq!(result.to_string(), "injected conflict");
        result.merge(ValidationResult::conflict(ConflictType::Injected));
        assert_eq!(result.to_string(), "injected conflict (+1 more)");
        assert_eq!(result.conflict_count(), 2);
    }
}
