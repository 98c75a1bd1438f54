//! Transaction context for OCC
//!
//! This module implements the core transaction data structure for optimistic
//! concurrency control. TransactionContext tracks every read and buffered
//! write of a transaction so the commit path can validate it against the
//! live store.
//!
//! Two kinds of reads are tracked:
//! - **Point reads** by record id, with the version observed (0 = absent)
//! - **Range reads** over the number index, with the `(number, id)` pairs
//!   observed
//!
//! Range reads are what make "read the max, then insert max + 1" and "read
//! everything above the victim, then shift it" safe: a concurrent insert,
//! delete or renumbering inside the range changes what the range would
//! return, and the transaction aborts.

use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use recipeseq_core::{
    NumberingError, RecipeNumber, RecipeRecord, RecordId, Result, SnapshotView, StoreError,
};

use crate::validation::ValidationResult;

/// Error type for commit failures
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    /// Transaction aborted because its reads are stale
    #[error("commit failed: {0}")]
    ValidationFailed(ValidationResult),

    /// The store's unique constraint rejected the write set
    #[error("unique constraint: {0}")]
    UniqueViolation(StoreError),

    /// The deadline passed before the commit could complete
    #[error("deadline exceeded after {}ms", elapsed.as_millis())]
    DeadlineExceeded {
        /// Time since the transaction began
        elapsed: Duration,
    },

    /// Transaction was not in correct state for commit
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Commit log write failed; nothing was applied
    #[error("commit log error: {0}")]
    Log(String),

    /// The store refused a commit that had already been logged
    #[error("apply failed after logging: {0}")]
    Apply(StoreError),
}

impl CommitError {
    /// Whether retrying with a fresh snapshot may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CommitError::ValidationFailed(_) | CommitError::UniqueViolation(_)
        )
    }
}

impl From<CommitError> for NumberingError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => NumberingError::conflict(result.to_string()),
            CommitError::UniqueViolation(err) => NumberingError::conflict(err.to_string()),
            CommitError::DeadlineExceeded { elapsed } => NumberingError::Timeout { elapsed },
            CommitError::InvalidState(msg) => NumberingError::internal(msg),
            CommitError::Log(message) => NumberingError::Storage { message },
            CommitError::Apply(err) => NumberingError::Storage {
                message: err.to_string(),
            },
        }
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed)
/// - `Validating` → `Aborted` (conflict detected)
/// - `Active` → `Aborted` (caller abort, deadline or error)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// A range of the number index read by a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRead {
    /// Inclusive lower bound
    pub start: RecipeNumber,
    /// Inclusive upper bound, `None` for unbounded
    pub end: Option<RecipeNumber>,
    /// What the range held in the snapshot
    pub observed: Vec<(RecipeNumber, RecordId)>,
}

/// Summary of buffered operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Buffered puts
    pub puts: usize,
    /// Buffered deletes
    pub deletes: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.puts + self.deletes
    }
}

/// Transaction context for OCC with snapshot isolation
///
/// # Read-Your-Writes Semantics
///
/// When reading a record, the transaction checks in order:
/// 1. **write_set**: Returns the buffered record from this transaction
/// 2. **delete_set**: Returns None for a buffered delete
/// 3. **snapshot**: Returns the snapshot record, tracked in read_set
///
/// # Deadline
///
/// Every read checks the deadline afterwards, so a slow store surfaces as
/// `Timeout` rather than an operation that never returns.
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,
    /// Commit version of the snapshot this transaction reads
    pub start_version: u64,

    snapshot: Box<dyn SnapshotView>,
    started_at: Instant,
    deadline: Option<Instant>,

    /// Records read and the version observed (0 = did not exist)
    pub read_set: FxHashMap<RecordId, u64>,
    /// Ranges of the number index read
    pub range_reads: Vec<RangeRead>,
    /// Buffered record writes
    pub write_set: FxHashMap<RecordId, RecipeRecord>,
    /// Buffered deletes
    pub delete_set: FxHashSet<RecordId>,

    /// Current transaction status
    pub status: TransactionStatus,
}

impl TransactionContext {
    /// Begin a transaction over `snapshot`
    pub fn new(txn_id: u64, snapshot: Box<dyn SnapshotView>, deadline: Option<Instant>) -> Self {
        Self {
            txn_id,
            start_version: snapshot.version(),
            snapshot,
            started_at: Instant::now(),
            deadline,
            read_set: FxHashMap::default(),
            range_reads: Vec::new(),
            write_set: FxHashMap::default(),
            delete_set: FxHashSet::default(),
            status: TransactionStatus::Active,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read a record by id
    pub fn get(&mut self, id: &RecordId) -> Result<Option<RecipeRecord>> {
        self.ensure_active()?;
        if let Some(record) = self.write_set.get(id) {
            return Ok(Some(record.clone()));
        }
        if self.delete_set.contains(id) {
            return Ok(None);
        }
        let found = self.snapshot.get(id);
        let version = found.as_ref().map_or(0, |v| v.version);
        self.read_set.entry(*id).or_insert(version);
        self.check_deadline()?;
        Ok(found.map(|v| v.value))
    }

    /// Read the record currently holding `number`
    pub fn get_by_number(&mut self, number: RecipeNumber) -> Result<Option<RecipeRecord>> {
        let mut hits = self.scan(number, Some(number))?;
        Ok(hits.pop())
    }

    /// Read every record with `start <= number <= end`, ascending
    ///
    /// Merges buffered writes over the snapshot. `end = None` is unbounded.
    pub fn scan(
        &mut self,
        start: RecipeNumber,
        end: Option<RecipeNumber>,
    ) -> Result<Vec<RecipeRecord>> {
        self.ensure_active()?;
        let observed = self.snapshot.range(start, end);
        self.range_reads.push(RangeRead {
            start,
            end,
            observed: observed.clone(),
        });
        self.check_deadline()?;

        let in_range = |n: RecipeNumber| n >= start && end.map_or(true, |e| n <= e);
        let mut records = Vec::with_capacity(observed.len());
        for (_, id) in observed {
            if self.write_set.contains_key(&id) || self.delete_set.contains(&id) {
                continue;
            }
            if let Some(record) = self.get(&id)? {
                records.push(record);
            }
        }
        records.extend(
            self.write_set
                .values()
                .filter(|r| in_range(r.recipe_number))
                .cloned(),
        );
        records.sort_by_key(|r| r.recipe_number);
        Ok(records)
    }

    /// Highest live number visible to this transaction
    ///
    /// Records a range read from the current maximum upwards, so any
    /// concurrent commit that adds a higher number, or moves or removes the
    /// maximum, invalidates this transaction.
    pub fn max_number(&mut self) -> Result<Option<RecipeNumber>> {
        self.ensure_active()?;
        if !self.write_set.is_empty() || !self.delete_set.is_empty() {
            let all = self.scan(RecipeNumber::FIRST, None)?;
            return Ok(all.last().map(|r| r.recipe_number));
        }

        let top = self.snapshot.max_entry();
        let start = top.map_or(RecipeNumber::FIRST, |(n, _)| n);
        self.range_reads.push(RangeRead {
            start,
            end: None,
            observed: top.into_iter().collect(),
        });
        self.check_deadline()?;
        Ok(top.map(|(n, _)| n))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Buffer a full record write
    pub fn put(&mut self, record: RecipeRecord) -> Result<()> {
        self.ensure_active()?;
        self.delete_set.remove(&record.id);
        self.write_set.insert(record.id, record);
        Ok(())
    }

    /// Buffer a delete
    pub fn delete(&mut self, id: RecordId) -> Result<()> {
        self.ensure_active()?;
        self.write_set.remove(&id);
        self.delete_set.insert(id);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Fail unless the transaction is still `Active`
    pub fn ensure_active(&self) -> Result<()> {
        match &self.status {
            TransactionStatus::Active => Ok(()),
            other => Err(NumberingError::internal(format!(
                "transaction {} is {:?}, expected Active",
                self.txn_id, other
            ))),
        }
    }

    /// Fail with `Timeout` if the deadline has passed
    pub fn check_deadline(&self) -> Result<()> {
        if self.is_past_deadline() {
            return Err(NumberingError::Timeout {
                elapsed: self.elapsed(),
            });
        }
        Ok(())
    }

    /// Whether the deadline has passed
    pub fn is_past_deadline(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the transaction buffered no writes
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty() && self.delete_set.is_empty()
    }

    /// Counts of buffered operations
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            puts: self.write_set.len(),
            deletes: self.delete_set.len(),
        }
    }

    /// Buffered writes in ascending number order and deletes in id order
    ///
    /// The ordering is deterministic so a retried transaction produces the
    /// same commit record for the same inputs.
    pub fn commit_parts(&self) -> (Vec<RecipeRecord>, Vec<RecordId>) {
        let mut puts: Vec<RecipeRecord> = self.write_set.values().cloned().collect();
        puts.sort_by_key(|r| r.recipe_number);
        let mut deletes: Vec<RecordId> = self.delete_set.iter().copied().collect();
        deletes.sort();
        (puts, deletes)
    }

    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            ref other => Err(NumberingError::internal(format!(
                "cannot commit transaction {} from {:?}",
                self.txn_id, other
            ))),
        }
    }

    /// `Active | Validating` → `Aborted`
    ///
    /// Buffered operations are discarded.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> Result<()> {
        match self.status {
            TransactionStatus::Active | TransactionStatus::Validating => {
                self.write_set.clear();
                self.delete_set.clear();
                self.status = TransactionStatus::Aborted {
                    reason: reason.into(),
                };
                Ok(())
            }
            ref other => Err(NumberingError::internal(format!(
                "cannot abort transaction {} from {:?}",
                self.txn_id, other
            ))),
        }
    }

    /// Whether the transaction can still be aborted
    pub fn can_rollback(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        )
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version)
            .field("status", &self.status)
            .field("reads", &self.read_set.len())
            .field("range_reads", &self.range_reads.len())
            .field("puts", &self.write_set.len())
            .field("deletes", &self.delete_set.len())
            .finish()
    }
}
