//! Append-only commit log with crash recovery
//!
//! The log lives in a single file, `commits.log`, inside the data
//! directory. Each committed transaction is one framed record (see
//! `record`). A commit is durable once its frame is fully on disk; a crash
//! partway through a write leaves a torn tail that `replay` cuts off, so a
//! transaction is recovered entirely or not at all.
//!
//! A failed append is rolled back: the file is cut back to its length
//! before the append, so a record the caller saw fail is never replayed.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::{LogError, LogResult};
use crate::mode::DurabilityMode;
use crate::record::{decode_frame, CommitRecord, FrameOutcome};

/// File name of the commit log inside the data directory
pub const LOG_FILE_NAME: &str = "commits.log";

/// Destination for commit log bytes
///
/// Implemented for `File`. Frames are written unbuffered, so after an error
/// the sink holds at most a partial frame past the last good length.
pub trait LogSink: Write + Send {
    /// Cut the sink back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Force written bytes to stable storage
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Cumulative commit log counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCounters {
    /// Records appended
    pub appends: u64,
    /// fsync calls issued
    pub sync_calls: u64,
    /// Bytes written
    pub bytes_written: u64,
    /// Appends that failed and were cut back off the log
    pub rollbacks: u64,
}

/// Append-only commit log
///
/// In `Cache` mode no file is opened and `append` is a no-op.
pub struct CommitLog {
    sink: Option<Box<dyn LogSink>>,
    /// Bytes in the sink that belong to complete records
    len: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    path: PathBuf,
    durability: DurabilityMode,
    writes_since_sync: usize,
    last_sync: Instant,
    counters: LogCounters,
}

impl CommitLog {
    /// Open (or create) the commit log in `dir`
    ///
    /// Run `replay` first when reopening an existing directory: it removes
    /// any torn tail so new records are appended after the last good one.
    pub fn open(dir: &Path, durability: DurabilityMode) -> LogResult<Self> {
        let path = dir.join(LOG_FILE_NAME);
        if !durability.requires_log() {
            return Ok(Self::build(None, 0, path, durability));
        }
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self::build(Some(Box::new(file)), len, path, durability))
    }

    /// A log over a caller-supplied sink that already holds `len` bytes
    ///
    /// Used to put a faulty device under the commit path.
    pub fn with_sink(sink: Box<dyn LogSink>, len: u64, durability: DurabilityMode) -> Self {
        Self::build(Some(sink), len, PathBuf::new(), durability)
    }

    /// A log that never touches disk
    pub fn ephemeral() -> Self {
        Self::build(None, 0, PathBuf::new(), DurabilityMode::Cache)
    }

    fn build(
        sink: Option<Box<dyn LogSink>>,
        len: u64,
        path: PathBuf,
        durability: DurabilityMode,
    ) -> Self {
        Self {
            sink,
            len,
            poisoned: false,
            path,
            durability,
            writes_since_sync: 0,
            last_sync: Instant::now(),
            counters: LogCounters::default(),
        }
    }

    /// Append one commit record
    ///
    /// Respects the durability mode:
    /// - `Cache`: no-op
    /// - `Always`: write and fsync before returning
    /// - `Standard`: write; fsync once the batch or interval is due
    ///
    /// On error nothing of this record remains in the log.
    pub fn append(&mut self, record: &CommitRecord) -> LogResult<()> {
        if self.sink.is_none() {
            return Ok(());
        }
        if self.poisoned {
            return Err(LogError::Poisoned);
        }

        let frame = record.to_frame()?;
        let start = self.len;
        if let Err(e) = self.write_frame(&frame) {
            self.rollback(start, &e);
            return Err(e);
        }

        self.len += frame.len() as u64;
        self.counters.appends += 1;
        self.counters.bytes_written += frame.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> LogResult<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        sink.write_all(frame)?;
        sink.flush()?;

        let pending = self.writes_since_sync + 1;
        let due = match self.durability {
            DurabilityMode::Always => true,
            DurabilityMode::Standard {
                interval_ms,
                batch_size,
            } => {
                pending >= batch_size
                    || self.last_sync.elapsed().as_millis() as u64 >= interval_ms
            }
            DurabilityMode::Cache => false,
        };
        if due {
            self.sync()?;
        } else {
            self.writes_since_sync = pending;
        }
        Ok(())
    }

    fn rollback(&mut self, len: u64, cause: &LogError) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match sink.truncate(len) {
            Ok(()) => {
                self.counters.rollbacks += 1;
                warn!(
                    target: "recipeseq::recovery",
                    len,
                    error = %cause,
                    "Commit log append failed, rolled back"
                );
            }
            Err(e) => {
                self.poisoned = true;
                error!(
                    target: "recipeseq::recovery",
                    len,
                    error = %e,
                    cause = %cause,
                    "Commit log rollback failed, refusing further appends"
                );
            }
        }
    }

    /// Flush and fsync everything written so far
    pub fn sync(&mut self) -> LogResult<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
            sink.sync()?;
            self.counters.sync_calls += 1;
            self.writes_since_sync = 0;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    /// Durability mode this log was opened with
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// Path of the log file (empty for an ephemeral log or custom sink)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of complete records in the log
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the log holds no records
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a failed rollback has disabled appends
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Cumulative counters
    pub fn counters(&self) -> LogCounters {
        self.counters.clone()
    }
}

impl Drop for CommitLog {
    fn drop(&mut self) {
        if self.sink.is_some() && !self.poisoned {
            if let Err(e) = self.sync() {
                warn!(target: "recipeseq::recovery", error = %e, "Failed to sync commit log on drop");
            }
        }
    }
}

/// Why replay stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every byte belonged to a complete record
    EndOfLog,
    /// The last frame was cut short
    TornTail,
    /// A frame failed its checksum
    ChecksumMismatch,
}

/// Result of replaying a commit log
#[derive(Debug)]
pub struct ReplayResult {
    /// Complete records, in log order
    pub records: Vec<CommitRecord>,
    /// Byte offset just past the last complete record
    pub valid_end: u64,
    /// Bytes discarded after `valid_end`
    pub truncated_bytes: u64,
    /// Why reading stopped
    pub stop_reason: StopReason,
}

impl ReplayResult {
    /// Highest commit version seen (0 if none)
    pub fn final_version(&self) -> u64 {
        self.records.iter().map(|r| r.version).max().unwrap_or(0)
    }

    /// Highest transaction id seen (0 if none)
    pub fn max_txn_id(&self) -> u64 {
        self.records.iter().map(|r| r.txn_id).max().unwrap_or(0)
    }
}

/// Read every complete record from the log in `dir`
///
/// Stops at the first torn or corrupt frame and truncates the file there,
/// so the next `CommitLog::open` appends after the last good record. A
/// missing log file replays as empty.
pub fn replay(dir: &Path) -> LogResult<ReplayResult> {
    let path = dir.join(LOG_FILE_NAME);
    let mut data = Vec::new();
    match File::open(&path) {
        Ok(mut file) => {
            file.read_to_end(&mut data)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ReplayResult {
                records: Vec::new(),
                valid_end: 0,
                truncated_bytes: 0,
                stop_reason: StopReason::EndOfLog,
            });
        }
        Err(e) => return Err(e.into()),
    }

    let mut records = Vec::new();
    let mut pos = 0usize;
    let stop_reason = loop {
        if pos == data.len() {
            break StopReason::EndOfLog;
        }
        match decode_frame(&data[pos..], pos as u64)? {
            FrameOutcome::Complete { record, consumed } => {
                records.push(record);
                pos += consumed;
            }
            FrameOutcome::Incomplete => break StopReason::TornTail,
            FrameOutcome::ChecksumMismatch => break StopReason::ChecksumMismatch,
        }
    };

    let truncated_bytes = (data.len() - pos) as u64;
    if truncated_bytes > 0 {
        warn!(
            target: "recipeseq::recovery",
            path = %path.display(),
            valid_end = pos,
            truncated_bytes,
            reason = ?stop_reason,
            "Truncating commit log after last complete record"
        );
        let file = OpenOptions::new().write(true).open(&path)?;
        file.set_len(pos as u64)?;
        file.sync_all()?;
    }

    info!(
        target: "recipeseq::recovery",
        records = records.len(),
        "Commit log replayed"
    );
    debug!(target: "recipeseq::recovery", ?stop_reason, "Replay stop reason");

    Ok(ReplayResult {
        records,
        valid_end: pos as u64,
        truncated_bytes,
        stop_reason,
    })
}
