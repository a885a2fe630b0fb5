//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::warn;

use crate::error::{Result, StringDbError};
use super::{WalEntry, HEADER_SIZE};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

/// Outcome of scanning the raw log bytes
struct Scan {
    entries: Vec<WalEntry>,
    result: RecoveryResult,
    /// Length of the valid prefix
    valid_len: u64,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first corrupted entry (its length field cannot be trusted)
    /// 3. Truncate partial writes and corruption at the end
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let scan = Self::scan(path)?;

        if scan.result.was_truncated {
            warn!(
                path = %path.display(),
                valid_len = scan.valid_len,
                corrupted = scan.result.entries_corrupted,
                "truncating damaged WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        Ok((scan.entries, scan.result))
    }

    /// Verify integrity of a WAL file without modifying it
    ///
    /// `was_truncated` reports whether `recover` would truncate.
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Ok(Self::scan(path)?.result)
    }

    fn scan(path: &Path) -> Result<Scan> {
        let data = fs::read(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut offset = 0usize;

        while offset < data.len() {
            let rest = &data[offset..];
            if rest.len() < HEADER_SIZE {
                result.was_truncated = true;
                break;
            }

            let total = WalEntry::frame_len(rest);
            if total > rest.len() {
                result.was_truncated = true;
                break;
            }

            match WalEntry::deserialize(&rest[..total]) {
                Ok(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                    offset += total;
                }
                Err(StringDbError::WalCorruption(reason)) => {
                    warn!(offset, %reason, "corrupted WAL entry");
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Scan {
            entries,
            result,
            valid_len: offset as u64,
        })
    }
}
