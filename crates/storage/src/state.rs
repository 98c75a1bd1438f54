//! Committed store state
//!
//! `StoreState` is the immutable value a snapshot points at. The store
//! keeps the current one behind an `Arc` and swaps in a modified copy on
//! each commit, so taking a snapshot is a reference-count bump.

use std::collections::{BTreeMap, HashSet};

use recipeseq_core::{
    RecipeNumber, RecipeRecord, RecordId, StoreError, StoreResult, VersionedRecord,
};

/// Records plus the unique number index, at one commit version
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub(crate) records: BTreeMap<RecordId, VersionedRecord>,
    pub(crate) by_number: BTreeMap<RecipeNumber, RecordId>,
    pub(crate) version: u64,
}

impl StoreState {
    /// Check a commit against this state without changing it
    ///
    /// Enforces the reserved floor and the unique constraint on
    /// `recipe_number`. A number held by a record that the same commit
    /// rewrites or deletes counts as free.
    pub(crate) fn check(
        &self,
        version: u64,
        puts: &[RecipeRecord],
        deletes: &[RecordId],
    ) -> StoreResult<()> {
        if version <= self.version {
            return Err(StoreError::StaleVersion {
                version,
                current: self.version,
            });
        }

        let touched: HashSet<RecordId> = puts
            .iter()
            .map(|r| r.id)
            .chain(deletes.iter().copied())
            .collect();

        let mut claimed: BTreeMap<RecipeNumber, RecordId> = BTreeMap::new();
        for record in puts {
            let number = record.recipe_number;
            if number.is_reserved() {
                return Err(StoreError::ReservedNumber { number });
            }
            if let Some(other) = claimed.insert(number, record.id) {
                return Err(StoreError::UniqueViolation {
                    number,
                    holder: other,
                });
            }
            if let Some(holder) = self.by_number.get(&number) {
                if !touched.contains(holder) {
                    return Err(StoreError::UniqueViolation {
                        number,
                        holder: *holder,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply a commit that already passed `check`
    pub(crate) fn apply_unchecked(
        &mut self,
        version: u64,
        puts: &[RecipeRecord],
        deletes: &[RecordId],
    ) {
        // Release every number the commit touches before claiming new ones,
        // so a shifted record can move into a slot freed in the same commit.
        for id in puts.iter().map(|r| &r.id).chain(deletes.iter()) {
            if let Some(old) = self.records.get(id) {
                let old_number = old.value.recipe_number;
                if self.by_number.get(&old_number) == Some(id) {
                    self.by_number.remove(&old_number);
                }
            }
        }
        for id in deletes {
            self.records.remove(id);
        }
        for record in puts {
            self.by_number.insert(record.recipe_number, record.id);
            self.records
                .insert(record.id, VersionedRecord::new(record.clone(), version));
        }
        self.version = version;
    }
}
