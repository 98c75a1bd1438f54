//! Storage layer for recipe numbering
//!
//! This crate implements the in-memory transactional store:
//! - RecipeStore: versioned records plus a unique number index
//! - StoreSnapshot: O(1) point-in-time views
//! - FaultInjector: forced conflicts and read latency for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fault;
pub mod snapshot;
mod state;
pub mod store;

pub use fault::FaultInjector;
pub use snapshot::StoreSnapshot;
pub use store::RecipeStore;
