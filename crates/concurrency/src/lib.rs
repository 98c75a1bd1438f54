//! Concurrency layer for recipe numbering
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - TransactionContext: point and range read tracking, buffered writes
//! - Snapshot isolation over the store's copy-on-write state
//! - First-committer-wins validation at commit time
//! - TransactionManager: the commit sequence and commit log ownership

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{
    CommitError, PendingOperations, RangeRead, TransactionContext, TransactionStatus,
};
pub use validation::{
    validate_range_reads, validate_read_set, validate_transaction, ConflictType,
    ValidationResult,
};
