//! Sequence compaction
//!
//! After the record at `deleted` is removed, every record above it moves
//! down by one. The shifted set is re-derived from the transaction's own
//! snapshot on every attempt, and all moves land in the same commit, so
//! readers never see a gap or a duplicate.

use recipeseq_concurrency::TransactionContext;
use recipeseq_core::{RecipeNumber, Result};
use tracing::debug;

/// Closes the gap left by a deleted record
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceCompactor;

impl SequenceCompactor {
    /// Create a compactor
    pub fn new() -> Self {
        Self
    }

    /// Shift every record numbered above `deleted` down by one
    ///
    /// Records are processed in ascending number order. Returns how many
    /// records were rewritten; deleting the highest record rewrites none.
    pub fn compact(&self, txn: &mut TransactionContext, deleted: RecipeNumber) -> Result<usize> {
        let above = txn.scan(deleted.next(), None)?;
        for record in &above {
            txn.put(record.renumbered(record.recipe_number.prev()))?;
        }
        debug!(
            target: "recipeseq::compact",
            txn_id = txn.txn_id,
            deleted = deleted.get(),
            shifted = above.len(),
            "Compacted numbering"
        );
        Ok(above.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipeseq_core::{RecipeRecord, SnapshotView, Storage};
    use recipeseq_storage::RecipeStore;
    use serde_json::json;

    fn seeded(numbers: std::ops::RangeInclusive<u64>) -> (RecipeStore, Vec<RecipeRecord>) {
        let store = RecipeStore::new();
        let records: Vec<_> = numbers
            .map(|n| RecipeRecord::new(RecipeNumber::new(n), "author".into(), json!({"n": n})))
            .collect();
        store.apply(1, &records, &[]).unwrap();
        (store, records)
    }

    fn delete_and_compact(store: &RecipeStore, victim: &RecipeRecord) -> usize {
        let mut txn = TransactionContext::new(1, store.snapshot(), None);
        txn.delete(victim.id).unwrap();
        let shifted = SequenceCompactor::new()
            .compact(&mut txn, victim.recipe_number)
            .unwrap();
        let (puts, deletes) = txn.commit_parts();
        store.apply(2, &puts, &deletes).unwrap();
        shifted
    }

    #[test]
    fn test_middle_delete_shifts_survivors() {
        let (store, records) = seeded(6..=10);
        assert_eq!(delete_and_compact(&store, &records[2]), 2);

        let snapshot = store.snapshot();
        let numbers: Vec<u64> = snapshot
            .range(RecipeNumber::FIRST, None)
            .iter()
            .map(|(n, _)| n.get())
            .collect();
        assert_eq!(numbers, vec![6, 7, 8, 9]);
        // Old 9 is now 8, old 10 is now 9
        assert_eq!(snapshot.id_for(RecipeNumber::new(8)), Some(records[3].id));
        assert_eq!(snapshot.id_for(RecipeNumber::new(9)), Some(records[4].id));
    }

    #[test]
    fn test_highest_delete_shifts_nothing() {
        let (store, records) = seeded(6..=8);
        assert_eq!(delete_and_compact(&store, &records[2]), 0);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_shift_preserves_payload_and_identity() {
        let (store, records) = seeded(6..=7);
        delete_and_compact(&store, &records[0]);
        let moved = store.snapshot().get(&records[1].id).unwrap().value;
        assert_eq!(moved.recipe_number, RecipeNumber::new(6));
        assert_eq!(moved.payload, records[1].payload);
        assert_eq!(moved.created_at, records[1].created_at);
    }
}
