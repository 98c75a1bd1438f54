//! Commit log errors

use thiserror::Error;

/// Result alias for commit log operations
pub type LogResult<T> = std::result::Result<T, LogError>;

/// Errors from writing or replaying the commit log
#[derive(Debug, Error)]
pub enum LogError {
    /// Underlying file I/O failed
    #[error("commit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded
    #[error("commit record encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A record passed its checksum but could not be decoded
    #[error("commit record decode error at offset {offset}: {message}")]
    Decode {
        /// Byte offset of the record
        offset: u64,
        /// Decoder message
        message: String,
    },

    /// The record declares a format this build cannot read
    #[error("unsupported commit record format {version} at offset {offset}")]
    UnsupportedFormat {
        /// Byte offset of the record
        offset: u64,
        /// Declared format version
        version: u8,
    },

    /// An earlier failed append could not be cut back off the log
    #[error("commit log disabled: a failed append could not be rolled back")]
    Poisoned,
}
