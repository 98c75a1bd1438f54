//! Core types and traits for recipe numbering
//!
//! This crate defines the foundational types used throughout the system:
//! - RecordId / RecipeNumber: identity and user-facing position of a recipe
//! - RecipeRecord: the persisted entity
//! - PayloadPatch: partial payload updates
//! - NumberingError / StoreError: error taxonomy
//! - Storage / SnapshotView: the transactional store seam

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod traits;
pub mod types;

pub use error::{NumberingError, Result, StoreError, StoreResult};
pub use limits::{FIRST_ALLOCATABLE, MAX_PAGE_SIZE, RECORD_FIELDS, RESERVED_MAX};
pub use traits::{SnapshotView, Storage};
pub use types::{
    Payload, PayloadPatch, RecipeNumber, RecipeRecord, RecordId, Versioned, VersionedRecord,
};
