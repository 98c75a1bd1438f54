//! Durability layer for recipe numbering
//!
//! This crate provides the optional commit log:
//! - DurabilityMode: Cache / Standard / Always
//! - CommitRecord: one committed transaction, CRC-framed
//! - CommitLog: append-only writer
//! - replay: crash recovery that drops torn tails
//! - testing: sinks that fail on demand

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod log;
pub mod mode;
pub mod record;
pub mod testing; // Fault-injecting log sinks

pub use error::{LogError, LogResult};
pub use log::{
    replay, CommitLog, LogCounters, LogSink, ReplayResult, StopReason, LOG_FILE_NAME,
};
pub use mode::DurabilityMode;
pub use record::{CommitRecord, RECORD_FORMAT_VERSION};
