//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Validation (first-committer-wins)
//! 2. Unique-constraint check against the store
//! 3. Commit log append (durability)
//! 4. Store application (visibility)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Acquire the commit lock (bounded by the transaction deadline)
//! 2. Check the deadline
//! 3. mark_validating()
//! 4. Validate reads against the live store; IF conflicts: abort
//! 5. Check the write set against the store's unique constraint
//! 6. Append CommitRecord to the log (DURABILITY POINT)
//! 7. Apply to the store (VISIBILITY POINT)
//! 8. mark_committed()
//! ```
//!
//! Steps 2-7 run under the commit lock, so validation always sees the
//! latest committed state and no two commits interleave. Reads never take
//! the lock. Validation reads through `Storage::validation_snapshot`, which
//! injected read latency does not touch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error};

use recipeseq_core::Storage;
use recipeseq_durability::{CommitLog, CommitRecord};
use recipeseq_storage::FaultInjector;

use crate::transaction::{CommitError, TransactionContext};
use crate::validation::{validate_transaction, ConflictType, ValidationResult};

/// Manages transaction lifecycle and atomic commits
pub struct TransactionManager {
    /// Last committed version
    version: AtomicU64,
    /// Next transaction ID
    next_txn_id: AtomicU64,
    /// Commit lock; owns the log so only the committer can append
    log: Mutex<CommitLog>,
    faults: FaultInjector,
}

impl TransactionManager {
    /// Create a manager with an ephemeral log
    pub fn new(initial_version: u64) -> Self {
        Self::with_log(initial_version, 0, CommitLog::ephemeral(), FaultInjector::new())
    }

    /// Create a manager over an opened commit log
    ///
    /// # Arguments
    /// * `initial_version` - Last committed version (from the store or recovery)
    /// * `max_txn_id` - Highest txn id already in the log; new ids start above it
    /// * `log` - Commit log to append to
    /// * `faults` - Fault injector consulted during validation
    pub fn with_log(
        initial_version: u64,
        max_txn_id: u64,
        log: CommitLog,
        faults: FaultInjector,
    ) -> Self {
        Self {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(max_txn_id + 1),
            log: Mutex::new(log),
            faults,
        }
    }

    /// Last committed version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Begin a transaction over a fresh snapshot of `store`
    pub fn begin<S: Storage + ?Sized>(
        &self,
        store: &S,
        deadline: Option<Instant>,
    ) -> TransactionContext {
        let txn_id = self.next_txn_id();
        let txn = TransactionContext::new(txn_id, store.snapshot(), deadline);
        debug!(
            target: "recipeseq::txn",
            txn_id,
            start_version = txn.start_version,
            "Transaction started"
        );
        txn
    }

    /// Commit a transaction atomically
    ///
    /// # Returns
    /// - `Ok(version)` the commit version (the snapshot version for a
    ///   read-only transaction)
    /// - `Err(CommitError)` with the transaction marked aborted
    pub fn commit<S: Storage + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> Result<u64, CommitError> {
        if txn.ensure_active().is_err() {
            return Err(CommitError::InvalidState(format!("{:?}", txn.status)));
        }

        let mut log = match self.lock_log(txn) {
            Some(guard) => guard,
            None => return Err(self.fail(txn, deadline_error(txn))),
        };

        if txn.is_past_deadline() {
            return Err(self.fail(txn, deadline_error(txn)));
        }

        txn.mark_validating()
            .map_err(|e| CommitError::InvalidState(e.to_string()))?;

        if self.faults.take_forced_conflict() {
            let result = ValidationResult::conflict(ConflictType::Injected);
            return Err(self.fail(txn, CommitError::ValidationFailed(result)));
        }

        let current = store.validation_snapshot();
        let result = validate_transaction(txn, current.as_ref());
        if !result.is_valid() {
            return Err(self.fail(txn, CommitError::ValidationFailed(result)));
        }

        if txn.is_read_only() {
            txn.mark_committed()
                .map_err(|e| CommitError::InvalidState(e.to_string()))?;
            return Ok(current.version());
        }

        let version = store.current_version() + 1;
        let (puts, deletes) = txn.commit_parts();

        if let Err(e) = store.check(version, &puts, &deletes) {
            return Err(self.fail(txn, CommitError::UniqueViolation(e)));
        }

        let record = CommitRecord {
            txn_id: txn.txn_id,
            version,
            puts,
            deletes,
        };
        if let Err(e) = log.append(&record) {
            return Err(self.fail(txn, CommitError::Log(e.to_string())));
        }

        // DURABILITY POINT: the commit is in the log

        if let Err(e) = store.apply(version, &record.puts, &record.deletes) {
            // Unreachable while `check` and `apply` run under the same lock;
            // the log still holds the commit and replays it on restart.
            error!(
                target: "recipeseq::txn",
                txn_id = txn.txn_id,
                version,
                error = %e,
                "Store apply failed after commit log append"
            );
            return Err(self.fail(txn, CommitError::Apply(e)));
        }

        self.version.store(version, Ordering::SeqCst);
        let marked = txn.mark_committed();
        if let Err(e) = &marked {
            error!(target: "recipeseq::txn", txn_id = txn.txn_id, error = %e, "Committed transaction in unexpected state");
        }
        debug_assert!(marked.is_ok(), "{:?}", marked);
        debug!(
            target: "recipeseq::txn",
            txn_id = txn.txn_id,
            version,
            puts = record.puts.len(),
            deletes = record.deletes.len(),
            "Transaction committed"
        );
        Ok(version)
    }

    /// Explicitly abort a transaction
    ///
    /// Buffered operations are discarded; nothing is logged.
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) {
        let reason = reason.into();
        if txn.can_rollback() {
            debug!(target: "recipeseq::txn", txn_id = txn.txn_id, %reason, "Transaction aborted");
            let _ = txn.mark_aborted(reason);
        }
    }

    /// Flush and fsync the commit log
    pub fn sync_log(&self) -> Result<(), CommitError> {
        self.log.lock().sync().map_err(|e| CommitError::Log(e.to_string()))
    }

    fn lock_log(&self, txn: &TransactionContext) -> Option<MutexGuard<'_, CommitLog>> {
        match txn.deadline() {
            Some(deadline) => self.log.try_lock_until(deadline),
            None => Some(self.log.lock()),
        }
    }

    fn fail(&self, txn: &mut TransactionContext, err: CommitError) -> CommitError {
        self.abort(txn, err.to_string());
        err
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(0)
    }
}

fn deadline_error(txn: &TransactionContext) -> CommitError {
    CommitError::DeadlineExceeded {
        elapsed: txn.elapsed(),
    }
}
