//! Commit record format
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! `Length` counts only the payload. The CRC covers the format byte and the
//! payload. The payload is a MessagePack-encoded `CommitRecord`.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use recipeseq_core::{RecipeRecord, RecordId};

use crate::error::{LogError, LogResult};

/// Current commit record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Bytes of framing around each payload (length + format + crc)
pub const FRAME_OVERHEAD: usize = 4 + 1 + 4;

/// One committed transaction as written to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Transaction that produced the commit
    pub txn_id: u64,
    /// Commit version assigned to every write
    pub version: u64,
    /// Records written (full images)
    pub puts: Vec<RecipeRecord>,
    /// Records removed
    pub deletes: Vec<RecordId>,
}

impl CommitRecord {
    /// Encode this record into a framed byte buffer
    pub fn to_frame(&self) -> LogResult<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(self)?;
        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.push(RECORD_FORMAT_VERSION);
        frame.extend_from_slice(&payload);

        let mut hasher = Hasher::new();
        hasher.update(&frame[4..]);
        frame.extend_from_slice(&hasher.finalize().to_le_bytes());
        Ok(frame)
    }
}

/// Outcome of decoding one frame from the front of a buffer
#[derive(Debug)]
pub enum FrameOutcome {
    /// A whole, checksummed record
    Complete {
        /// The decoded record
        record: CommitRecord,
        /// Bytes consumed, including framing
        consumed: usize,
    },
    /// The buffer ends partway through a frame (torn write)
    Incomplete,
    /// The frame is complete but its checksum does not match
    ChecksumMismatch,
}

/// Decode the frame at the start of `buf`
///
/// `offset` is only used in error messages.
///
/// # Errors
///
/// Returns an error when a checksummed frame has an unknown format or a
/// payload that does not decode. Torn tails and checksum failures are
/// reported through `FrameOutcome`, not as errors.
pub fn decode_frame(buf: &[u8], offset: u64) -> LogResult<FrameOutcome> {
    if buf.len() < 4 {
        return Ok(FrameOutcome::Incomplete);
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = len + FRAME_OVERHEAD;
    if buf.len() < total {
        return Ok(FrameOutcome::Incomplete);
    }

    let body = &buf[4..5 + len];
    let stored_crc = u32::from_le_bytes([
        buf[5 + len],
        buf[6 + len],
        buf[7 + len],
        buf[8 + len],
    ]);
    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != stored_crc {
        return Ok(FrameOutcome::ChecksumMismatch);
    }

    let format = body[0];
    if format != RECORD_FORMAT_VERSION {
        return Err(LogError::UnsupportedFormat {
            offset,
            version: format,
        });
    }

    let record: CommitRecord = rmp_serde::from_slice(&body[1..]).map_err(|e| LogError::Decode {
        offset,
        message: e.to_string(),
    })?;
    Ok(FrameOutcome::Complete {
        record,
        consumed: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipeseq_core::RecipeNumber;
    use serde_json::json;

    fn sample() -> CommitRecord {
        let record = RecipeRecord::new(
            RecipeNumber::new(6),
            "alice".into(),
            json!({"title": "Pho", "steps": ["simmer", "serve"]}),
        );
        CommitRecord {
            txn_id: 3,
            version: 7,
            puts: vec![record],
            deletes: vec![RecordId::new()],
        }
    }

    #[test]
    fn test_frame_decodes_to_same_record() {
        let rec = sample();
        let frame = rec.to_frame().unwrap();
        match decode_frame(&frame, 0).unwrap() {
            FrameOutcome::Complete { record, consumed } => {
                assert_eq!(record, rec);
                assert_eq!(consumed, frame.len());
            }
            other => panic!("expected complete frame, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_frame_is_incomplete() {
        let frame = sample().to_frame().unwrap();
        for cut in [0, 3, 5, frame.len() - 1] {
            assert!(matches!(
                decode_frame(&frame[..cut], 0).unwrap(),
                FrameOutcome::Incomplete
            ));
        }
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let mut frame = sample().to_frame().unwrap();
        let mid = frame.len() / 2;
        frame[mid] ^= 0xFF;
        assert!(matches!(
            decode_frame(&frame, 0).unwrap(),
            FrameOutcome::ChecksumMismatch
        ));
    }
}
