//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::error;

use crate::config::WalSyncStrategy;
use crate::error::{Result, StringDbError};
use super::{Operation, WalEntry, WalReader};

/// Writes entries to the WAL file
pub struct WalWriter {
    file: File,
    /// End of the last complete frame
    len: u64,
    /// LSN the next appended entry receives
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    uncommitted: usize,
    /// A failed append could not be rolled back; the tail is untrusted
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Existing entries are scanned to continue the LSN sequence. The file
    /// must already be free of damaged tails (see `WalRecovery::recover`).
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut last_lsn = 0;
        if path.exists() {
            for entry in WalReader::open(path)?.entries() {
                last_lsn = entry?.lsn;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            file,
            len,
            current_lsn: last_lsn + 1,
            sync_strategy,
            uncommitted: 0,
            poisoned: false,
        })
    }

    /// Append an operation to the WAL, returning its LSN
    ///
    /// A frame that fails to write or sync is cut off again, so later
    /// appends never land behind a partial frame. If that rollback fails
    /// too, every further append is refused until the log is reopened.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        if self.poisoned {
            return Err(StringDbError::Storage(
                "WAL tail is damaged after a failed append; reopen the store".into(),
            ));
        }

        let lsn = self.current_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;

        if let Err(e) = self.write_frame(&bytes) {
            if let Err(rollback) = self.discard_partial() {
                error!(error = %rollback, "cannot roll back failed WAL append");
                self.poisoned = true;
            }
            return Err(e);
        }

        self.len += bytes.len() as u64;
        self.current_lsn += 1;
        Ok(lsn)
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.uncommitted += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count.max(1),
        };
        if should_sync {
            self.sync()?;
        }
        Ok(())
    }

    /// Cut the file back to the last complete frame
    fn discard_partial(&mut self) -> Result<()> {
        self.file.set_len(self.len)?;
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.sync_all()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Drop all entries (after their contents are durable elsewhere)
    ///
    /// The LSN sequence keeps counting.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        self.len = 0;
        self.uncommitted = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Get the LSN the next entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Entries appended since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WalRecovery;
    use tempfile::TempDir;

    fn batch(first_key: u64) -> Operation {
        Operation::InsertBatch {
            first_key,
            values: vec!["abcd".to_string(); 4],
        }
    }

    #[test]
    fn test_partial_frame_is_discarded_before_next_append() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        let mut writer = WalWriter::open(&path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(batch(1)).unwrap();

        // Half a frame reached the file before the write failed
        let frame = WalEntry::new(2, batch(5)).serialize().unwrap();
        writer.file.write_all(&frame[..frame.len() / 2]).unwrap();
        writer.discard_partial().unwrap();

        writer.append(batch(5)).unwrap();

        let (entries, result) = WalRecovery::recover(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!result.was_truncated);
    }

    #[test]
    fn test_failed_append_without_rollback_poisons_writer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wal.log");
        let mut writer = WalWriter::open(&path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(batch(1)).unwrap();

        // Read-only handle: both the write and the rollback fail
        writer.file = File::open(&path).unwrap();

        assert!(matches!(writer.append(batch(5)), Err(StringDbError::Io(_))));
        assert!(matches!(
            writer.append(batch(5)),
            Err(StringDbError::Storage(_))
        ));
        assert_eq!(writer.current_lsn(), 2);
    }
}
