//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// Fixed per-record overhead counted towards the size limit (key + length)
const RECORD_OVERHEAD: usize = 12;

/// In-memory table for recent inserts
pub struct MemTable {
    data: RwLock<BTreeMap<u64, String>>,
    /// Approximate size in bytes
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Insert consecutive keys starting at `first_key`
    ///
    /// Keys are allocated once, so an insert never replaces an entry.
    pub fn insert_batch(&self, first_key: u64, values: &[String]) {
        let mut data = self.data.write();
        let mut added = 0;
        for (offset, value) in values.iter().enumerate() {
            let previous = data.insert(first_key + offset as u64, value.clone());
            debug_assert!(previous.is_none(), "record key reused");
            added += RECORD_OVERHEAD + value.len();
        }
        self.size.fetch_add(added, Ordering::SeqCst);
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot of all entries in key order (for flush and scans)
    pub fn snapshot(&self) -> Vec<(u64, String)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::SeqCst);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_batch_assigns_consecutive_keys() {
        let table = MemTable::new();
        table.insert_batch(5, &["a".to_string(), "b".to_string()]);

        let entries = table.snapshot();
        assert_eq!(entries, vec![(5, "a".to_string()), (6, "b".to_string())]);
    }

    #[test]
    fn test_size_tracks_inserts_and_clear() {
        let table = MemTable::new();
        table.insert_batch(1, &["xyz".to_string()]);
        assert_eq!(table.size(), RECORD_OVERHEAD + 3);
        assert!(table.should_flush(RECORD_OVERHEAD + 3));
        assert!(!table.should_flush(RECORD_OVERHEAD + 4));

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
    }
}
