//! recipeseq - dense, gap-free recipe numbering
//!
//! Every recipe is exposed by a small positive number. Numbers 1-5 belong
//! to a static featured list; stored recipes are numbered from 6 upwards
//! with no gaps and no duplicates, even under concurrent creates and
//! deletes.
//!
//! # Quick Start
//!
//! ```
//! use recipeseq::{NumberingService, RecipeNumber};
//! use serde_json::json;
//!
//! let service = NumberingService::new();
//! let soup = service.create_with_number(json!({"title": "Soup"}), "alice")?;
//! let stew = service.create_with_number(json!({"title": "Stew"}), "bob")?;
//! assert_eq!(soup.recipe_number, RecipeNumber::new(6));
//!
//! // Deleting #6 moves everything above it down by one
//! service.delete_by_number(soup.recipe_number)?;
//! assert_eq!(service.get_by_number(RecipeNumber::new(6))?.id, stew.id);
//! # Ok::<(), recipeseq::NumberingError>(())
//! ```
//!
//! # Architecture
//!
//! All mutations go through [`NumberingService`]; it never hands out its
//! store, only read-only snapshots. The lower layers (storage,
//! concurrency, durability) are re-exported as modules for callers that
//! build their own stores or need the transaction types directly.

pub use recipeseq_core::{
    NumberingError, Payload, PayloadPatch, RecipeNumber, RecipeRecord, RecordId, Result,
    SnapshotView, Storage,
};
pub use recipeseq_engine::{
    InvariantReport, NumberingConfig, NumberingService, Page, RetryConfig, ServiceMetrics,
    CONFIG_FILE_NAME,
};

pub use recipeseq_concurrency as concurrency;
pub use recipeseq_durability as durability;
pub use recipeseq_storage as storage;
