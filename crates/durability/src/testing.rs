//! Fault-injecting log sinks
//!
//! `FailingSink` is a file-backed `LogSink` that fails writes or
//! truncations on demand. A failed write leaves half the buffer on disk,
//! which is what a full disk or a short write looks like to the log.
//!
//! # Example
//!
//! ```ignore
//! use recipeseq_durability::testing::{FailingSink, SinkFaults};
//!
//! let faults = SinkFaults::new();
//! let sink = FailingSink::open(&path, faults.clone())?;
//! faults.fail_next_writes(1);
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::log::LogSink;

/// Shared switches for a `FailingSink`
#[derive(Debug, Clone, Default)]
pub struct SinkFaults {
    failing_writes: Arc<AtomicU64>,
    failing_truncate: Arc<AtomicBool>,
}

impl SinkFaults {
    /// No faults armed
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` write calls after writing half their bytes
    pub fn fail_next_writes(&self, n: u64) {
        self.failing_writes.fetch_add(n, Ordering::SeqCst);
    }

    /// Make every truncation fail while `on`
    pub fn fail_truncate(&self, on: bool) {
        self.failing_truncate.store(on, Ordering::SeqCst);
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A file-backed sink that fails when told to
pub struct FailingSink {
    file: File,
    faults: SinkFaults,
}

impl FailingSink {
    /// Open `path` for appending, creating it if missing
    pub fn open(path: &Path, faults: SinkFaults) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file, faults })
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.faults.take_write_failure() {
            self.file.write_all(&buf[..buf.len() / 2])?;
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl LogSink for FailingSink {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        if self.faults.failing_truncate.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected truncate failure"));
        }
        self.file.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}
