//! Invariant audit over a committed snapshot
//!
//! Checks the dense-numbering invariants: unique numbers, no reserved
//! numbers in the store, and live numbers forming `6..=max` with no gaps.
//! Run after recovery and by tests; never on the write path.

use std::fmt;

use recipeseq_core::{RecipeNumber, RecordId, SnapshotView};

/// Result of auditing one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvariantReport {
    /// Snapshot version audited
    pub version: u64,
    /// Live records
    pub live_count: usize,
    /// Highest live number
    pub max_number: Option<RecipeNumber>,
    /// Numbers missing from `6..=max`
    pub gaps: Vec<RecipeNumber>,
    /// Numbers `<= 5` present in the store
    pub reserved: Vec<RecipeNumber>,
    /// Records whose stored number disagrees with the number index
    pub mismatched: Vec<RecordId>,
    /// Records missing from the number index, which means two records
    /// claim the same number
    pub unindexed: usize,
}

impl InvariantReport {
    /// Whether every invariant holds
    pub fn is_ok(&self) -> bool {
        self.gaps.is_empty()
            && self.reserved.is_empty()
            && self.mismatched.is_empty()
            && self.unindexed == 0
    }

    /// The number the allocator would hand out next
    pub fn next_number(&self) -> RecipeNumber {
        self.max_number
            .map_or(RecipeNumber::RESERVED_FLOOR, |max| {
                max.max(RecipeNumber::RESERVED_FLOOR)
            })
            .next()
    }
}

impl fmt::Display for InvariantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(
                f,
                "ok: {} records at v{}, next {}",
                self.live_count,
                self.version,
                self.next_number()
            );
        }
        write!(
            f,
            "violated at v{}: {} gap(s), {} reserved, {} mismatched, {} unindexed",
            self.version,
            self.gaps.len(),
            self.reserved.len(),
            self.mismatched.len(),
            self.unindexed
        )
    }
}

/// Audit a snapshot
pub fn audit_snapshot(snapshot: &dyn SnapshotView) -> InvariantReport {
    let entries = snapshot.range(RecipeNumber::new(0), None);
    let mut report = InvariantReport {
        version: snapshot.version(),
        live_count: snapshot.len(),
        max_number: entries.last().map(|(n, _)| *n),
        unindexed: snapshot.len().saturating_sub(entries.len()),
        ..InvariantReport::default()
    };

    let mut expected = RecipeNumber::FIRST;
    for (number, id) in &entries {
        if number.is_reserved() {
            report.reserved.push(*number);
        } else {
            while expected < *number {
                report.gaps.push(expected);
                expected = expected.next();
            }
            expected = number.next();
        }
        match snapshot.get(id) {
            Some(stored) if stored.value.recipe_number == *number => {}
            _ => report.mismatched.push(*id),
        }
    }
    report
}
