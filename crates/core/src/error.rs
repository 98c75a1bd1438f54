//! Error types for recipe numbering
//!
//! `NumberingError` is the taxonomy callers see. Every variant is either a
//! caller mistake (`Validation`, `NotFound`, `Forbidden`) or a transient
//! condition that is safe to retry (`Conflict`, `Timeout`, `Storage`).
//! In every case the underlying transaction has been aborted before the
//! error is returned.

use std::time::Duration;
use thiserror::Error;

use crate::types::{RecipeNumber, RecordId};

/// Result type alias for numbering operations
pub type Result<T> = std::result::Result<T, NumberingError>;

/// Caller-facing error taxonomy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NumberingError {
    /// Malformed input at the service boundary
    #[error("validation failed: {reason}")]
    Validation {
        /// What was wrong
        reason: String,
    },

    /// No live record carries this number
    #[error("no recipe with number {number}")]
    NotFound {
        /// The requested number
        number: RecipeNumber,
    },

    /// The number is in the reserved featured range
    #[error("recipe number {number} is reserved")]
    Forbidden {
        /// The requested number
        number: RecipeNumber,
    },

    /// The transaction could not commit because of concurrent writers
    #[error("conflict after {attempts} attempt(s): {reason}")]
    Conflict {
        /// Attempts made before giving up
        attempts: usize,
        /// Last conflict observed
        reason: String,
    },

    /// The operation ran past its deadline and was aborted
    #[error("operation timed out after {}ms", elapsed.as_millis())]
    Timeout {
        /// Time spent before the deadline fired
        elapsed: Duration,
    },

    /// The commit log could not record the transaction
    #[error("storage error: {message}")]
    Storage {
        /// Underlying failure
        message: String,
    },

    /// A transaction was used outside its lifecycle
    #[error("internal error: {message}")]
    Internal {
        /// Description of the misuse
        message: String,
    },
}

impl NumberingError {
    /// Shorthand for `Validation`
    pub fn validation(reason: impl Into<String>) -> Self {
        NumberingError::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a single-attempt `Conflict`
    pub fn conflict(reason: impl Into<String>) -> Self {
        NumberingError::Conflict {
            attempts: 1,
            reason: reason.into(),
        }
    }

    /// Shorthand for `Internal`
    pub fn internal(message: impl Into<String>) -> Self {
        NumberingError::Internal {
            message: message.into(),
        }
    }

    /// Whether this is a commit conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, NumberingError::Conflict { .. })
    }

    /// Whether this is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, NumberingError::Timeout { .. })
    }

    /// Whether the caller may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NumberingError::Conflict { .. }
                | NumberingError::Timeout { .. }
                | NumberingError::Storage { .. }
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            NumberingError::Validation { .. } => "VALIDATION",
            NumberingError::NotFound { .. } => "NOT_FOUND",
            NumberingError::Forbidden { .. } => "FORBIDDEN",
            NumberingError::Conflict { .. } => "CONFLICT",
            NumberingError::Timeout { .. } => "TIMEOUT",
            NumberingError::Storage { .. } => "STORAGE",
            NumberingError::Internal { .. } => "INTERNAL",
        }
    }

    /// HTTP status a surrounding web layer should use
    pub fn status_code(&self) -> u16 {
        match self {
            NumberingError::Validation { .. } => 400,
            NumberingError::NotFound { .. } => 404,
            NumberingError::Forbidden { .. } => 403,
            NumberingError::Conflict { .. } => 409,
            NumberingError::Timeout { .. } => 504,
            NumberingError::Storage { .. } => 503,
            NumberingError::Internal { .. } => 500,
        }
    }
}

/// Result type alias for storage apply operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a store while applying a commit
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A written number is already held by a record outside the commit
    #[error("recipe number {number} already held by {holder}")]
    UniqueViolation {
        /// The contested number
        number: RecipeNumber,
        /// Record currently holding it
        holder: RecordId,
    },

    /// A record reached the store with a reserved number
    #[error("recipe number {number} is reserved and cannot be stored")]
    ReservedNumber {
        /// The offending number
        number: RecipeNumber,
    },

    /// Commit versions must increase
    #[error("commit version {version} is not newer than {current}")]
    StaleVersion {
        /// Version offered
        version: u64,
        /// Store's current version
        current: u64,
    },
}
