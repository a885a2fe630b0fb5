//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StringDbError};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert `values` under consecutive keys starting at `first_key`.
    /// One entry per batch, so a batch is replayed whole or not at all.
    InsertBatch { first_key: u64, values: Vec<String> },
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as `[LSN][CRC][Len][payload]`
    ///
    /// The CRC covers the LSN, the length and the payload.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            StringDbError::Serialization(format!("WAL payload too large: {} bytes", payload.len()))
        })?;

        let crc = compute_crc(self.lsn, len, &payload);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u64_le(self.lsn);
        buf.put_u32_le(crc);
        buf.put_u32_le(len);
        buf.put_slice(&payload);

        Ok(buf.to_vec())
    }

    /// Decode one complete frame
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StringDbError::WalCorruption(format!(
                "truncated header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let (lsn, crc, len) = read_header(bytes);
        let end = HEADER_SIZE + len as usize;
        if bytes.len() < end {
            return Err(StringDbError::WalCorruption(format!(
                "truncated payload: expected {} bytes, got {}",
                len,
                bytes.len() - HEADER_SIZE
            )));
        }

        let payload = &bytes[HEADER_SIZE..end];
        if compute_crc(lsn, len, payload) != crc {
            return Err(StringDbError::WalCorruption(format!(
                "CRC mismatch at LSN {}",
                lsn
            )));
        }

        let entry: WalEntry = bincode::deserialize(payload)
            .map_err(|e| StringDbError::WalCorruption(format!("undecodable payload: {}", e)))?;

        if entry.lsn != lsn {
            return Err(StringDbError::WalCorruption(format!(
                "header LSN {} does not match payload LSN {}",
                lsn, entry.lsn
            )));
        }

        Ok(entry)
    }

    /// Total frame length announced by a header (header + payload)
    pub fn frame_len(header: &[u8]) -> usize {
        let (_, _, len) = read_header(header);
        HEADER_SIZE + len as usize
    }
}

/// Split a header into (lsn, crc, len). Caller guarantees `HEADER_SIZE` bytes.
fn read_header(bytes: &[u8]) -> (u64, u32, u32) {
    let mut lsn = [0u8; 8];
    let mut crc = [0u8; 4];
    let mut len = [0u8; 4];
    lsn.copy_from_slice(&bytes[0..8]);
    crc.copy_from_slice(&bytes[8..12]);
    len.copy_from_slice(&bytes[12..16]);
    (
        u64::from_le_bytes(lsn),
        u32::from_le_bytes(crc),
        u32::from_le_bytes(len),
    )
}

fn compute_crc(lsn: u64, len: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
