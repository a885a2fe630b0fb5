//! Storage Manager
//!
//! Manages multiple SSTables and coordinates flushes and scans.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Create new SSTables from MemTable flushes
//! - Track total record count and the highest persisted key
//! - Scan all records in key order

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, StringDbError};

use super::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - All methods use `&self` (no exclusive access needed)
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered oldest → newest.
    /// Keys only grow, so this is also ascending key order.
    sstables: RwLock<Vec<SSTableReader>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing SSTable files
    /// 3. Open and checksum each one
    /// 4. Order by ID ascending (oldest first)
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut sstable_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            if let Some(id) = Self::parse_sstable_id(&file_path) {
                sstable_ids.push(id);
            } else if file_path.extension().is_some_and(|ext| ext == "tmp") {
                debug!(path = %file_path.display(), "removing unfinished SSTable");
                fs::remove_file(&file_path)?;
            }
        }
        sstable_ids.sort_unstable();

        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            let reader = SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?;
            sstables.push(reader);
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.last().map(|&id| id + 1).unwrap_or(1);

        debug!(dir = %path.display(), tables = sstables.len(), "storage opened");

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Flush records (ascending keys) to a new SSTable
    pub fn flush(&self, records: &[(u64, String)]) -> Result<SSTable> {
        if records.is_empty() {
            return Err(StringDbError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);
        // Only complete tables ever carry the .sst extension
        let tmp_path = path.with_extension("tmp");

        let mut builder = SSTableBuilder::new(&tmp_path)?;
        for (key, value) in records {
            builder.add(*key, value)?;
        }
        let mut metadata = builder.finish()?;
        fs::rename(&tmp_path, &path)?;
        metadata.path = path.clone();

        let reader = Self::open_flushed(&path)?;
        self.sstables.write().push(reader);

        debug!(
            id,
            records = metadata.entry_count,
            bytes = metadata.file_size,
            "flushed SSTable"
        );

        Ok(metadata)
    }

    /// Total records across all SSTables
    pub fn record_count(&self) -> u64 {
        self.sstables.read().iter().map(|t| t.entry_count()).sum()
    }

    /// Highest key persisted in any SSTable
    pub fn max_key(&self) -> Option<u64> {
        self.sstables.read().iter().filter_map(|t| t.max_key()).max()
    }

    /// Iterators over every SSTable, in ascending key order
    pub fn scan(&self) -> Result<Vec<SSTableIterator>> {
        self.sstables.read().iter().map(|t| t.iter()).collect()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Open a freshly renamed table, removing it if it cannot be read back
    fn open_flushed(path: &Path) -> Result<SSTableReader> {
        SSTableReader::open(path).map_err(|e| {
            if let Err(remove) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %remove, "cannot remove unreadable SSTable");
            }
            e
        })
    }

    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unreadable_flushed_table_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = StorageManager::sstable_path_with_dir(temp.path(), 1);
        fs::write(&path, b"not a table").unwrap();

        assert!(StorageManager::open_flushed(&path).is_err());
        assert!(!path.exists());

        // A later open does not trip over it
        let manager = StorageManager::open(temp.path()).unwrap();
        assert_eq!(manager.sstable_count(), 0);
    }
}
