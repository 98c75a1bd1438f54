//! The numbering service
//!
//! `NumberingService` is the only surface other subsystems use to create,
//! delete, update and read numbered recipes. Every mutation runs as one
//! optimistic transaction:
//!
//! ```text
//! create: read max ─► allocate max+1 ─► insert ─► commit
//! delete: read victim ─► delete ─► shift everything above down by one ─► commit
//! update: read record ─► merge patch into payload ─► commit
//! ```
//!
//! A commit that loses a race is retried from scratch with a fresh snapshot
//! under capped exponential backoff. Each operation carries a deadline that
//! bounds store reads, the commit-lock wait and the backoff sleeps.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use recipeseq_concurrency::{TransactionContext, TransactionManager};
use recipeseq_core::{
    NumberingError, Payload, PayloadPatch, RecipeNumber, RecipeRecord, Result, Storage,
    MAX_PAGE_SIZE, RECORD_FIELDS,
};
use recipeseq_durability::{replay, CommitLog};
use recipeseq_storage::{FaultInjector, RecipeStore, StoreSnapshot};

use crate::allocator::SequenceAllocator;
use crate::audit::{audit_snapshot, InvariantReport};
use crate::compactor::SequenceCompactor;
use crate::config::{NumberingConfig, CONFIG_FILE_NAME};
use crate::coordinator::{ServiceMetrics, TransactionCoordinator};

/// One page of the ordered listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Records in ascending number order
    pub records: Vec<RecipeRecord>,
    /// Cursor for the following page, `None` on the last page
    pub next_after: Option<RecipeNumber>,
}

/// Dense recipe numbering over a transactional store
pub struct NumberingService {
    store: Arc<RecipeStore>,
    coordinator: TransactionCoordinator,
    allocator: SequenceAllocator,
    compactor: SequenceCompactor,
    config: NumberingConfig,
    data_dir: Option<PathBuf>,
}

impl NumberingService {
    /// In-memory service with default settings
    pub fn new() -> Self {
        Self::ephemeral(NumberingConfig::cache())
    }

    /// In-memory service; the durability setting is ignored
    pub fn ephemeral(config: NumberingConfig) -> Self {
        let faults = FaultInjector::new();
        let store = Arc::new(RecipeStore::with_faults(faults.clone()));
        let manager = TransactionManager::with_log(0, 0, CommitLog::ephemeral(), faults);
        Self::assemble(store, manager, config, None)
    }

    /// Open a durable service in `dir`
    ///
    /// Creates the directory and a default `recipeseq.toml` on first use,
    /// then loads the config and recovers from the commit log.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(storage_error)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        NumberingConfig::write_default_if_missing(&config_path)?;
        let config = NumberingConfig::from_file(&config_path)?;
        Self::open_with_config(dir, config)
    }

    /// Open a service in `dir` with an explicit config
    ///
    /// With `durability = "cache"` nothing is read or written in `dir`.
    pub fn open_with_config<P: AsRef<Path>>(dir: P, config: NumberingConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let mode = config.durability_mode()?;
        if !mode.requires_log() {
            return Ok(Self::ephemeral(config));
        }
        std::fs::create_dir_all(dir).map_err(storage_error)?;

        let faults = FaultInjector::new();
        let store = Arc::new(RecipeStore::with_faults(faults.clone()));

        let mut recovered = replay(dir).map_err(storage_error)?;
        recovered.records.sort_by_key(|r| r.version);
        for record in &recovered.records {
            store
                .apply(record.version, &record.puts, &record.deletes)
                .map_err(storage_error)?;
        }

        let log = CommitLog::open(dir, mode).map_err(storage_error)?;
        let manager = TransactionManager::with_log(
            recovered.final_version(),
            recovered.max_txn_id(),
            log,
            faults,
        );
        let service = Self::assemble(store, manager, config, Some(dir.to_path_buf()));

        let report = service.audit();
        if report.is_ok() {
            info!(
                target: "recipeseq::recovery",
                path = %dir.display(),
                commits = recovered.records.len(),
                truncated_bytes = recovered.truncated_bytes,
                %report,
                "Numbering service opened"
            );
        } else {
            warn!(target: "recipeseq::recovery", %report, "Invariant audit failed after recovery");
        }
        Ok(service)
    }

    fn assemble(
        store: Arc<RecipeStore>,
        manager: TransactionManager,
        config: NumberingConfig,
        data_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            coordinator: TransactionCoordinator::new(manager),
            allocator: SequenceAllocator::new(),
            compactor: SequenceCompactor::new(),
            config,
            data_dir,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a record with the next free number
    ///
    /// # Errors
    /// - `Validation` if `author_id` is blank, `payload` is not an object, or
    ///   `payload` names a record-level field such as `recipeNumber`
    /// - `Conflict` once the retry budget is spent
    /// - `Timeout` if the deadline passes
    pub fn create_with_number(
        &self,
        payload: Payload,
        author_id: impl Into<String>,
    ) -> Result<RecipeRecord> {
        let author_id = author_id.into();
        validate_create(&payload, &author_id)?;

        let record = self.run("create", |txn| {
            let number = self.allocator.allocate(txn)?;
            let record = RecipeRecord::new(number, author_id.clone(), payload.clone());
            txn.put(record.clone())?;
            Ok(record)
        })?;
        debug!(
            target: "recipeseq::service",
            id = %record.id,
            number = record.recipe_number.get(),
            "Recipe created"
        );
        Ok(record)
    }

    /// Delete the record at `number` and close the gap
    ///
    /// # Errors
    /// - `Forbidden` for reserved numbers (`<= 5`)
    /// - `NotFound` if nothing holds `number`, including a repeat of a
    ///   delete that already succeeded
    /// - `Conflict` / `Timeout` as for create
    pub fn delete_by_number(&self, number: RecipeNumber) -> Result<()> {
        if number.is_reserved() {
            return Err(NumberingError::Forbidden { number });
        }

        let (id, shifted) = self.run("delete", |txn| {
            let victim = txn
                .get_by_number(number)?
                .ok_or(NumberingError::NotFound { number })?;
            txn.delete(victim.id)?;
            let shifted = self.compactor.compact(txn, number)?;
            Ok((victim.id, shifted))
        })?;
        debug!(
            target: "recipeseq::service",
            %id,
            number = number.get(),
            shifted,
            "Recipe deleted"
        );
        Ok(())
    }

    /// Merge `patch` into the payload of the record at `number`
    ///
    /// The number, id, author and creation time never change here.
    ///
    /// # Errors
    /// - `Validation` if the patch names a record-level field
    /// - `NotFound` if nothing holds `number`
    pub fn update_by_number(
        &self,
        number: RecipeNumber,
        patch: PayloadPatch,
    ) -> Result<RecipeRecord> {
        patch.validate()?;

        self.run("update", |txn| {
            let mut record = txn
                .get_by_number(number)?
                .ok_or(NumberingError::NotFound { number })?;
            patch.apply_to(&mut record.payload)?;
            txn.put(record.clone())?;
            Ok(record)
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The record at `number`
    pub fn get_by_number(&self, number: RecipeNumber) -> Result<RecipeRecord> {
        self.read(|txn| {
            txn.get_by_number(number)?
                .ok_or(NumberingError::NotFound { number })
        })
    }

    /// Every live record, ascending by number, from one snapshot
    pub fn list_ordered_by_number(&self) -> Result<Vec<RecipeRecord>> {
        self.read(|txn| txn.scan(RecipeNumber::FIRST, None))
    }

    /// Up to `limit` records numbered above `after`
    ///
    /// Pass `None` for the first page and the returned `next_after` for
    /// each following one. Pages are read from independent snapshots, so a
    /// concurrent delete can shift a record across a page boundary.
    ///
    /// # Errors
    /// `Validation` if `limit` is 0 or above `MAX_PAGE_SIZE`.
    pub fn list_page(&self, after: Option<RecipeNumber>, limit: usize) -> Result<Page> {
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(NumberingError::validation(format!(
                "page limit must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, limit
            )));
        }
        let start = match after {
            None => RecipeNumber::FIRST,
            Some(after) => match after.checked_next() {
                Some(start) => start.max(RecipeNumber::FIRST),
                // Nothing can sit above u64::MAX
                None => {
                    return Ok(Page {
                        records: Vec::new(),
                        next_after: None,
                    })
                }
            },
        };
        // One extra record tells us whether another page exists
        let end = RecipeNumber::new(start.get().saturating_add(limit as u64));

        let mut records = self.read(|txn| txn.scan(start, Some(end)))?;
        let next_after = if records.len() > limit {
            records.truncate(limit);
            records.last().map(|r| r.recipe_number)
        } else {
            None
        };
        Ok(Page {
            records,
            next_after,
        })
    }

    /// What the next create would be assigned, were it to run now
    pub fn peek_next_number(&self) -> Result<RecipeNumber> {
        self.read(|txn| self.allocator.allocate(txn))
    }

    /// Check the numbering invariants against the current state
    pub fn audit(&self) -> InvariantReport {
        audit_snapshot(self.store.snapshot().as_ref())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Transaction counters
    pub fn metrics(&self) -> ServiceMetrics {
        self.coordinator.metrics()
    }

    /// Active configuration
    pub fn config(&self) -> &NumberingConfig {
        &self.config
    }

    /// Data directory, `None` for an in-memory service
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Fault injection handle shared with the store and commit path
    pub fn faults(&self) -> &FaultInjector {
        self.store.faults()
    }

    /// Read-only view of the committed state
    ///
    /// The store itself is never handed out: every write to a record,
    /// and so to its number, goes through this service.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.create_snapshot()
    }

    /// Last committed version
    pub fn current_version(&self) -> u64 {
        self.coordinator.current_version()
    }

    /// Flush and fsync the commit log
    pub fn sync(&self) -> Result<()> {
        self.coordinator.sync()
    }

    // ========================================================================
    // Transaction plumbing
    // ========================================================================

    fn deadline(&self, started: Instant) -> Option<Instant> {
        self.config.op_timeout().map(|timeout| started + timeout)
    }

    /// Run `f` in a write transaction, retrying conflicts
    fn run<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: Fn(&mut TransactionContext) -> Result<T>,
    {
        let started = Instant::now();
        let deadline = self.deadline(started);
        let retry = &self.config.retry;

        for attempt in 0..=retry.max_retries {
            let mut txn = self.coordinator.start_transaction(self.store.as_ref(), deadline);
            let outcome = match f(&mut txn) {
                Ok(value) => self
                    .coordinator
                    .commit(&mut txn, self.store.as_ref())
                    .map(|_| value),
                Err(e) => {
                    self.coordinator.abort(&mut txn, e.to_string());
                    Err(e)
                }
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_conflict() && attempt < retry.max_retries => {
                    let delay = retry.calculate_delay(attempt);
                    if let Some(deadline) = deadline {
                        if Instant::now() + delay >= deadline {
                            warn!(target: "recipeseq::service", op, attempt, "Deadline reached during backoff");
                            return Err(NumberingError::Timeout {
                                elapsed: started.elapsed(),
                            });
                        }
                    }
                    warn!(
                        target: "recipeseq::service",
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Conflict, retrying"
                    );
                    self.coordinator.record_retry();
                    std::thread::sleep(delay);
                }
                Err(NumberingError::Conflict { reason, .. }) => {
                    warn!(target: "recipeseq::service", op, attempts = attempt + 1, %reason, "Retry budget exhausted");
                    return Err(NumberingError::Conflict {
                        attempts: attempt + 1,
                        reason,
                    });
                }
                Err(NumberingError::Timeout { .. }) => {
                    return Err(NumberingError::Timeout {
                        elapsed: started.elapsed(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Err(NumberingError::internal(format!(
            "{} retry loop exited without a result",
            op
        )))
    }

    /// Run `f` against a snapshot without committing
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TransactionContext) -> Result<T>,
    {
        let started = Instant::now();
        let mut txn = self
            .coordinator
            .read_transaction(self.store.as_ref(), self.deadline(started));
        f(&mut txn).map_err(|e| match e {
            NumberingError::Timeout { .. } => NumberingError::Timeout {
                elapsed: started.elapsed(),
            },
            other => other,
        })
    }
}

impl Default for NumberingService {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_create(payload: &Payload, author_id: &str) -> Result<()> {
    if author_id.trim().is_empty() {
        return Err(NumberingError::validation("authorId must not be empty"));
    }
    let fields = payload
        .as_object()
        .ok_or_else(|| NumberingError::validation("payload must be a JSON object"))?;
    if let Some(field) = RECORD_FIELDS.iter().find(|f| fields.contains_key(**f)) {
        return Err(NumberingError::validation(format!(
            "field '{}' is assigned by the service and cannot be supplied",
            field
        )));
    }
    Ok(())
}

fn storage_error(e: impl std::fmt::Display) -> NumberingError {
    NumberingError::Storage {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipeseq_core::SnapshotView;
    use serde_json::json;

    fn numbers(service: &NumberingService) -> Vec<u64> {
        service
            .list_ordered_by_number()
            .unwrap()
            .iter()
            .map(|r| r.recipe_number.get())
            .collect()
    }

    fn seeded(count: usize) -> NumberingService {
        let service = NumberingService::new();
        for i in 0..count {
            service
                .create_with_number(json!({"title": format!("r{}", i)}), "alice")
                .unwrap();
        }
        service
    }

    #[test]
    fn test_create_validation() {
        let service = NumberingService::new();
        assert!(matches!(
            service.create_with_number(json!({}), "  "),
            Err(NumberingError::Validation { .. })
        ));
        assert!(matches!(
            service.create_with_number(json!("soup"), "alice"),
            Err(NumberingError::Validation { .. })
        ));
        assert!(matches!(
            service.create_with_number(json!({"recipeNumber": 2}), "alice"),
            Err(NumberingError::Validation { .. })
        ));
        assert_eq!(service.metrics().total_started, 0);
    }

    #[test]
    fn test_create_assigns_from_six() {
        let service = seeded(3);
        assert_eq!(numbers(&service), vec![6, 7, 8]);
        assert_eq!(service.peek_next_number().unwrap(), RecipeNumber::new(9));
    }

    #[test]
    fn test_delete_reserved_is_forbidden() {
        let service = seeded(1);
        for n in 0..=5 {
            assert!(matches!(
                service.delete_by_number(RecipeNumber::new(n)),
                Err(NumberingError::Forbidden { .. })
            ));
        }
        assert_eq!(numbers(&service), vec![6]);
    }

    #[test]
    fn test_delete_twice_reports_not_found() {
        let service = seeded(2);
        service.delete_by_number(RecipeNumber::new(7)).unwrap();
        assert!(matches!(
            service.delete_by_number(RecipeNumber::new(7)),
            Err(NumberingError::NotFound { .. })
        ));
        let metrics = service.metrics();
        assert_eq!(metrics.total_retried, 0);
        assert_eq!(metrics.total_aborted, 1);
    }

    #[test]
    fn test_update_merges_payload_only() {
        let service = seeded(2);
        let before = service.get_by_number(RecipeNumber::new(7)).unwrap();
        let patch = PayloadPatch::new()
            .set("title", json!("Stew"))
            .set("servings", json!(4));
        let updated = service.update_by_number(RecipeNumber::new(7), patch).unwrap();

        assert_eq!(updated.id, before.id);
        assert_eq!(updated.recipe_number, RecipeNumber::new(7));
        assert_eq!(updated.payload, json!({"title": "Stew", "servings": 4}));
        assert_eq!(service.get_by_number(RecipeNumber::new(7)).unwrap(), updated);
    }

    #[test]
    fn test_update_rejects_number_change() {
        let service = seeded(1);
        let patch = PayloadPatch::new().set("recipeNumber", json!(1));
        assert!(matches!(
            service.update_by_number(RecipeNumber::new(6), patch),
            Err(NumberingError::Validation { .. })
        ));
        assert_eq!(
            service.get_by_number(RecipeNumber::new(6)).unwrap().recipe_number,
            RecipeNumber::new(6)
        );
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let service = seeded(1);
        let patch = PayloadPatch::new().set("title", json!("x"));
        assert!(matches!(
            service.update_by_number(RecipeNumber::new(9), patch),
            Err(NumberingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_get_reserved_is_not_found() {
        let service = seeded(1);
        assert!(matches!(
            service.get_by_number(RecipeNumber::new(3)),
            Err(NumberingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_page_walks_everything() {
        let service = seeded(7);
        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = service.list_page(after, 3).unwrap();
            seen.extend(page.records.iter().map(|r| r.recipe_number.get()));
            match page.next_after {
                Some(next) => after = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, (6..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_list_page_exact_fit_has_no_next() {
        let service = seeded(3);
        let page = service.list_page(None, 3).unwrap();
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.next_after, None);
    }

    #[test]
    fn test_list_page_after_largest_cursor_is_empty() {
        let service = seeded(2);
        let page = service
            .list_page(Some(RecipeNumber::new(u64::MAX)), 10)
            .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.next_after, None);

        let page = service
            .list_page(Some(RecipeNumber::new(u64::MAX - 1)), 10)
            .unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_snapshot_is_a_point_in_time_view() {
        let service = seeded(2);
        let before = service.snapshot();
        service.create_with_number(json!({}), "alice").unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(service.snapshot().len(), 3);
        assert_eq!(service.snapshot().version(), service.current_version());
        assert!(service.audit().is_ok());
    }

    #[test]
    fn test_list_page_rejects_bad_limit() {
        let service = NumberingService::new();
        assert!(service.list_page(None, 0).is_err());
        assert!(service.list_page(None, MAX_PAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_forced_conflict_is_retried() {
        let service = NumberingService::new();
        service.faults().fail_next_commits(1);
        let record = service.create_with_number(json!({}), "alice").unwrap();
        assert_eq!(record.recipe_number, RecipeNumber::new(6));

        let metrics = service.metrics();
        assert_eq!(metrics.total_retried, 1);
        assert_eq!(metrics.total_committed, 1);
        assert_eq!(service.snapshot().len(), 1);
    }

    #[test]
    fn test_retry_budget_exhaustion() {
        let config = NumberingConfig::cache().with_retry(
            crate::RetryConfig::new()
                .with_max_retries(2)
                .with_base_delay_ms(1),
        );
        let service = NumberingService::ephemeral(config);
        service.faults().fail_next_commits(3);

        let err = service.create_with_number(json!({}), "alice").unwrap_err();
        assert!(matches!(err, NumberingError::Conflict { attempts: 3, .. }));
        assert!(service.list_ordered_by_number().unwrap().is_empty());
    }

    #[test]
    fn test_open_cache_mode_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let service =
            NumberingService::open_with_config(dir.path(), NumberingConfig::cache()).unwrap();
        service.create_with_number(json!({}), "alice").unwrap();
        assert!(service.data_dir().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
