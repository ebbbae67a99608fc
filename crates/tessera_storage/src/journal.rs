//! Append-only journal of committed batches.
//!
//! Each commit writes one frame:
//!
//! ```text
//! | magic "TJNL" (4) | format (2) | payload len (4) | CBOR batch | crc32 (4) |
//! ```
//!
//! The CRC covers everything before it. A frame cut short by a crash is
//! dropped on replay; a complete frame with a bad checksum is an error.

use crate::backend::StorageBackend;
use crate::error::{EngineError, EngineResult};
use crate::state::IndexDef;
use serde::{Deserialize, Serialize};
use tessera_codec::{Key, Value};

/// Frame magic.
pub(crate) const JOURNAL_MAGIC: [u8; 4] = *b"TJNL";

/// Frame format version.
pub(crate) const JOURNAL_FORMAT: u16 = 1;

/// magic (4) + format (2) + length (4)
const HEADER_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

/// One change recorded in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum JournalEntry {
    SetVersion {
        version: u64,
    },
    CreateCollection {
        name: String,
        key_path: String,
    },
    DeleteCollection {
        name: String,
    },
    CreateIndex {
        collection: String,
        index: IndexDef,
    },
    DeleteIndex {
        collection: String,
        name: String,
    },
    Add {
        collection: String,
        key: Key,
        value: Value,
    },
    Put {
        collection: String,
        key: Key,
        value: Value,
    },
    Delete {
        collection: String,
        key: Key,
    },
    Clear {
        collection: String,
    },
}

/// Computes the IEEE CRC32 of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 == 0 {
                    crc >> 1
                } else {
                    (crc >> 1) ^ 0xEDB8_8320
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}

/// Journal over a byte backend.
pub(crate) struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl Journal {
    pub(crate) fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
        }
    }

    /// Writes one batch as a single frame and returns its offset.
    pub(crate) fn commit(&mut self, batch: &[JournalEntry]) -> EngineResult<u64> {
        let payload = tessera_codec::encode(batch)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| EngineError::data("journal batch exceeds 4 GiB"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&JOURNAL_MAGIC);
        frame.extend_from_slice(&JOURNAL_FORMAT.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        let offset = self.backend.append(&frame)?;
        if self.sync_on_commit {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        tracing::debug!(offset, entries = batch.len(), "journal frame committed");
        Ok(offset)
    }

    /// Reads every committed batch in order.
    ///
    /// A torn frame at the end is truncated away.
    pub(crate) fn replay(&mut self) -> EngineResult<Vec<Vec<JournalEntry>>> {
        let size = self.backend.size()?;
        let mut offset = 0u64;
        let mut batches = Vec::new();

        while offset < size {
            let remaining = size - offset;
            if remaining < (HEADER_SIZE + CRC_SIZE) as u64 {
                self.cut_tail(offset, size)?;
                break;
            }

            let header = self.backend.read_at(offset, HEADER_SIZE)?;
            if header[0..4] != JOURNAL_MAGIC {
                return Err(EngineError::corrupted(format!(
                    "bad frame magic at offset {offset}"
                )));
            }
            let format = u16::from_le_bytes([header[4], header[5]]);
            if format != JOURNAL_FORMAT {
                return Err(EngineError::corrupted(format!(
                    "unsupported frame format {format} at offset {offset}"
                )));
            }
            let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
            let frame_len = (HEADER_SIZE + len + CRC_SIZE) as u64;
            if remaining < frame_len {
                self.cut_tail(offset, size)?;
                break;
            }

            let body = self.backend.read_at(offset, HEADER_SIZE + len + CRC_SIZE)?;
            let (content, stored) = body.split_at(HEADER_SIZE + len);
            let expected = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
            let actual = compute_crc32(content);
            if expected != actual {
                return Err(EngineError::ChecksumMismatch {
                    offset,
                    expected,
                    actual,
                });
            }

            batches.push(tessera_codec::decode(&content[HEADER_SIZE..])?);
            offset += frame_len;
        }

        tracing::debug!(frames = batches.len(), bytes = offset, "journal replayed");
        Ok(batches)
    }

    fn cut_tail(&mut self, offset: u64, size: u64) -> EngineResult<()> {
        tracing::warn!(
            offset,
            dropped = size - offset,
            "truncating torn journal tail"
        );
        self.backend.truncate(offset)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}
