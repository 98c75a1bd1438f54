//! Sequence allocation
//!
//! The next number is always derived from the live maximum inside the
//! caller's transaction. Nothing is cached between calls, so a retried
//! attempt re-reads the maximum from its fresh snapshot.

use recipeseq_concurrency::TransactionContext;
use recipeseq_core::{NumberingError, RecipeNumber, Result};
use tracing::debug;

/// Computes the number for a new record
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceAllocator;

impl SequenceAllocator {
    /// Create an allocator
    pub fn new() -> Self {
        Self
    }

    /// `max(current max, 5) + 1`
    ///
    /// The read of the maximum is tracked by `txn`, so a concurrent commit
    /// that changes the top of the number line aborts this transaction.
    pub fn allocate(&self, txn: &mut TransactionContext) -> Result<RecipeNumber> {
        let current = txn.max_number()?;
        let next = current
            .map_or(RecipeNumber::RESERVED_FLOOR, |max| {
                max.max(RecipeNumber::RESERVED_FLOOR)
            })
            .checked_next()
            .ok_or_else(|| NumberingError::internal("recipe number space exhausted"))?;
        debug!(
            target: "recipeseq::alloc",
            txn_id = txn.txn_id,
            current_max = ?current.map(RecipeNumber::get),
            next = next.get(),
            "Allocated number"
        );
        Ok(next)
    }
}
