//! Transaction coordinator for numbering operations
//!
//! The TransactionCoordinator wraps TransactionManager and adds:
//! - Active transaction tracking
//! - Transaction metrics (started, committed, aborted, retried)
//! - Conversion of commit failures into `NumberingError`

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use recipeseq_concurrency::{TransactionContext, TransactionManager};
use recipeseq_core::{NumberingError, Result, Storage};
use tracing::debug;

/// Transaction coordinator for the numbering service
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering. They are observational only
/// and never synchronize other memory.
pub struct TransactionCoordinator {
    manager: TransactionManager,
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_retried: AtomicU64,
}

impl TransactionCoordinator {
    /// Wrap a transaction manager
    pub fn new(manager: TransactionManager) -> Self {
        Self {
            manager,
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
            total_retried: AtomicU64::new(0),
        }
    }

    /// Start a write transaction
    pub fn start_transaction<S: Storage + ?Sized>(
        &self,
        store: &S,
        deadline: Option<Instant>,
    ) -> TransactionContext {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
        self.manager.begin(store, deadline)
    }

    /// Open a read-only view that is never committed
    ///
    /// Reads from a single snapshot are already consistent, so these skip
    /// validation and are not counted in the metrics.
    pub fn read_transaction<S: Storage + ?Sized>(
        &self,
        store: &S,
        deadline: Option<Instant>,
    ) -> TransactionContext {
        TransactionContext::new(self.manager.next_txn_id(), store.snapshot(), deadline)
    }

    /// Commit through the concurrency layer
    ///
    /// # Returns
    /// * `Ok(commit_version)` - Transaction committed
    /// * `Err(NumberingError)` - Conflict, timeout, log failure or misuse
    pub fn commit<S: Storage + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> Result<u64> {
        match self.manager.commit(txn, store) {
            Ok(version) => {
                self.record_commit();
                Ok(version)
            }
            Err(e) => {
                self.record_abort();
                debug!(target: "recipeseq::txn", txn_id = txn.txn_id, error = %e, "Commit rejected");
                Err(NumberingError::from(e))
            }
        }
    }

    /// Abort a transaction that failed before commit
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) {
        self.manager.abort(txn, reason);
        self.record_abort();
    }

    /// Record that an operation is starting another attempt
    pub fn record_retry(&self) {
        self.total_retried.fetch_add(1, Ordering::Relaxed);
    }

    fn record_commit(&self) {
        self.finish();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_abort(&self) {
        self.finish();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        // Saturating decrement
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    /// Last committed version
    pub fn current_version(&self) -> u64 {
        self.manager.current_version()
    }

    /// Flush and fsync the commit log
    pub fn sync(&self) -> Result<()> {
        self.manager.sync_log().map_err(NumberingError::from)
    }

    /// Snapshot of the transaction counters
    pub fn metrics(&self) -> ServiceMetrics {
        ServiceMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: self.total_started.load(Ordering::Relaxed),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_retried: self.total_retried.load(Ordering::Relaxed),
        }
    }
}

/// Transaction statistics for the numbering service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceMetrics {
    /// Write transactions currently in flight
    pub active_count: u64,
    /// Write transactions started (one per attempt)
    pub total_started: u64,
    /// Write transactions committed
    pub total_committed: u64,
    /// Write transactions aborted, for any reason
    pub total_aborted: u64,
    /// Attempts that were retried after a conflict
    pub total_retried: u64,
}

impl ServiceMetrics {
    /// Transactions that finished (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Commit success rate (committed / started)
    pub fn commit_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_committed as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipeseq_core::{RecipeNumber, RecipeRecord};
    use recipeseq_storage::RecipeStore;
    use serde_json::json;

    fn record(n: u64) -> RecipeRecord {
        RecipeRecord::new(RecipeNumber::new(n), "author".into(), json!({}))
    }

    #[test]
    fn test_metrics_start_at_zero() {
        let coordinator = TransactionCoordinator::new(TransactionManager::new(0));
        assert_eq!(coordinator.metrics(), ServiceMetrics::default());
        assert_eq!(coordinator.metrics().commit_rate(), 0.0);
    }

    #[test]
    fn test_commit_updates_metrics() {
        let coordinator = TransactionCoordinator::new(TransactionManager::new(0));
        let store = RecipeStore::new();

        let mut txn = coordinator.start_transaction(&store, None);
        assert_eq!(coordinator.metrics().active_count, 1);
        txn.put(record(6)).unwrap();
        assert_eq!(coordinator.commit(&mut txn, &store).unwrap(), 1);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.total_started, 1);
        assert_eq!(metrics.total_committed, 1);
        assert_eq!(metrics.active_count, 0);
        assert_eq!(metrics.commit_rate(), 1.0);
        assert_eq!(coordinator.current_version(), 1);
    }

    #[test]
    fn test_conflict_maps_to_numbering_error() {
        let coordinator = TransactionCoordinator::new(TransactionManager::new(0));
        let store = RecipeStore::new();

        let mut a = coordinator.start_transaction(&store, None);
        let mut b = coordinator.start_transaction(&store, None);
        a.max_number().unwrap();
        b.max_number().unwrap();
        a.put(record(6)).unwrap();
        b.put(record(6)).unwrap();
        coordinator.commit(&mut a, &store).unwrap();

        let err = coordinator.commit(&mut b, &store).unwrap_err();
        assert!(err.is_conflict());
        let metrics = coordinator.metrics();
        assert_eq!(metrics.total_aborted, 1);
        assert_eq!(metrics.total_completed(), 2);
    }

    #[test]
    fn test_abort_and_retry_counters() {
        let coordinator = TransactionCoordinator::new(TransactionManager::new(0));
        let store = RecipeStore::new();

        let mut txn = coordinator.start_transaction(&store, None);
        coordinator.abort(&mut txn, "not found");
        coordinator.record_retry();

        let metrics = coordinator.metrics();
        assert_eq!(metrics.total_aborted, 1);
        assert_eq!(metrics.total_retried, 1);
        assert_eq!(metrics.active_count, 0);
    }

    #[test]
    fn test_read_transaction_is_not_counted() {
        let coordinator = TransactionCoordinator::new(TransactionManager::new(0));
        let store = RecipeStore::new();
        let mut txn = coordinator.read_transaction(&store, None);
        assert_eq!(txn.max_number().unwrap(), None);
        assert_eq!(coordinator.metrics().total_started, 0);
    }
}
