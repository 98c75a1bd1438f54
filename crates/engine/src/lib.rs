//! Numbering engine
//!
//! This crate orchestrates the lower layers into the numbering service:
//! - SequenceAllocator: next number = max(live max, 5) + 1
//! - SequenceCompactor: shift everything above a deleted number down by one
//! - NumberingService: create/delete/update/read with retry and deadlines
//! - TransactionCoordinator: commit plumbing and metrics
//! - NumberingConfig / RetryConfig: `recipeseq.toml` settings
//! - audit: invariant checks after recovery

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod audit;
pub mod compactor;
pub mod config;
pub mod coordinator;
pub mod retry;
pub mod service;

pub use allocator::SequenceAllocator;
pub use audit::{audit_snapshot, InvariantReport};
pub use compactor::SequenceCompactor;
pub use config::{NumberingConfig, CONFIG_FILE_NAME, DEFAULT_OP_TIMEOUT_MS};
pub use coordinator::{ServiceMetrics, TransactionCoordinator};
pub use retry::{RetryConfig, DEFAULT_MAX_RETRIES};
pub use service::{NumberingService, Page};
