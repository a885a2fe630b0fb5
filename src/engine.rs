//! Engine Module
//!
//! The record engine that coordinates schema, WAL, MemTable and Storage for
//! one store directory.
//!
//! ## Responsibilities
//! - Create or upgrade the schema on open
//! - Allocate record keys (strictly increasing, never reused)
//! - Make each batch durable in the WAL before it becomes visible
//! - Trigger flushes when the MemTable is full
//! - Manage crash recovery on startup

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, StringDbError};
use crate::memtable::MemTable;
use crate::record::{KeyRange, StringRecord};
use crate::schema::{self, Schema, SchemaChange};
use crate::storage::StorageManager;
use crate::wal::{Operation, WalRecovery, WalWriter};

/// The record engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (insert_batch/flush): Serialized by `write_lock`
///   - Must acquire: write_lock → WAL → memtable → storage
///   - Key allocation happens under the same lock
///
/// - **Reads** (count/records): no write_lock needed
///   - `record_count` is published after a batch is fully applied, so a
///     count never includes part of a batch
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory holding MANIFEST, wal.log and sstables/
    store_dir: PathBuf,

    /// Schema in effect after open
    schema: Schema,

    /// What open did to the schema
    schema_change: SchemaChange,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent inserts (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations (insert_batch/flush)
    write_lock: Mutex<()>,

    /// Key the next inserted record receives
    next_key: AtomicU64,

    /// Records visible to readers
    record_count: AtomicU64,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";
    const MANIFEST_FILENAME: &'static str = "MANIFEST";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create the store directory
    /// 2. Load the manifest and run the upgrade step if needed
    /// 3. Load existing SSTables
    /// 4. Recover from the WAL, skipping batches already flushed
    /// 5. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Store directory
        let store_dir = config.store_dir();
        fs::create_dir_all(&store_dir).map_err(|e| {
            StringDbError::OpenFailed(format!("cannot create {}: {}", store_dir.display(), e))
        })?;

        // Step 2: Schema
        let manifest_path = store_dir.join(Self::MANIFEST_FILENAME);
        let existing = schema::load_manifest(&manifest_path)?;
        let (schema, schema_change) = schema::upgrade(
            existing,
            &config.store_name,
            config.schema_version,
            config.value_index,
            config.string_length,
        )?;
        if schema_change != SchemaChange::Unchanged {
            schema::store_manifest(&manifest_path, &schema)?;
            info!(store = %config.store_name, ?schema_change, "schema written");
        }

        // Step 3: Storage
        let storage = StorageManager::open(&store_dir.join(Self::SSTABLE_DIR))
            .map_err(|e| StringDbError::OpenFailed(e.to_string()))?;
        let memtable = MemTable::new();

        // Step 4: WAL recovery
        let wal_path = store_dir.join(Self::WAL_FILENAME);
        let mut replayed = 0u64;
        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                info!(
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    last_lsn = recovery.last_lsn,
                    "WAL recovery"
                );
            }

            // Batches whose keys are already in an SSTable were flushed
            // before the WAL could be truncated.
            let flushed_through = storage.max_key().unwrap_or(0);
            for entry in entries {
                match entry.operation {
                    Operation::InsertBatch { first_key, values } => {
                        let skip = (flushed_through + 1).saturating_sub(first_key) as usize;
                        if skip < values.len() {
                            let start = first_key + skip as u64;
                            replayed += (values.len() - skip) as u64;
                            memtable.insert_batch(start, &values[skip..]);
                        }
                    }
                }
            }

            if !memtable.is_empty() {
                debug!(records = memtable.entry_count(), "flushing recovered records");
                storage.flush(&memtable.snapshot())?;
                memtable.clear();
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        // Everything the WAL held is now in SSTables
        wal.truncate()?;

        let next_key = storage.max_key().unwrap_or(0) + 1;
        let record_count = storage.record_count();

        info!(
            store = %config.store_name,
            version = schema.version,
            records = record_count,
            replayed,
            "store opened"
        );

        Ok(Self {
            config,
            store_dir,
            schema,
            schema_change,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            next_key: AtomicU64::new(next_key),
            record_count: AtomicU64::new(record_count),
        })
    }

    /// Open with a data directory (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Insert a batch of values as one unit of work
    ///
    /// Steps:
    /// 1. Validate every value
    /// 2. Acquire write lock and allocate keys
    /// 3. Write one WAL entry (durability, all-or-nothing on replay)
    /// 4. Write to MemTable and publish the new count
    /// 5. Flush if the MemTable is full
    pub fn insert_batch(&self, values: Vec<String>) -> Result<KeyRange> {
        if let Some(bad) = values
            .iter()
            .find(|v| v.chars().count() != self.config.string_length)
        {
            return Err(StringDbError::InsertFailed(format!(
                "value of length {} does not match record length {}",
                bad.chars().count(),
                self.config.string_length
            )));
        }

        let _write_guard = self.write_lock.lock();

        let first_key = self.next_key.load(Ordering::SeqCst);
        let len = values.len() as u64;
        if len == 0 {
            return Ok(KeyRange::new(first_key, 0));
        }

        self.wal
            .lock()
            .append(Operation::InsertBatch {
                first_key,
                values: values.clone(),
            })
            .map_err(|e| StringDbError::InsertFailed(e.to_string()))?;

        self.memtable.insert_batch(first_key, &values);
        self.next_key.store(first_key + len, Ordering::SeqCst);
        self.record_count.fetch_add(len, Ordering::SeqCst);

        if self.memtable.should_flush(self.config.memtable_size_limit) {
            // The batch is already durable in the WAL; a failed flush is
            // retried on the next insert or at close.
            if let Err(e) = self.flush_internal() {
                warn!(error = %e, "memtable flush failed");
            }
        }

        Ok(KeyRange::new(first_key, len))
    }

    /// Number of records (point-in-time snapshot)
    pub fn count(&self) -> u64 {
        self.record_count.load(Ordering::SeqCst)
    }

    /// Flush memtable to disk (public API)
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        // Step 1: Flush memtable to SSTable
        self.storage.flush(&self.memtable.snapshot())?;

        // Step 2: Clear memtable
        self.memtable.clear();

        // Step 3: Truncate WAL (entries are now durable in SSTable)
        self.wal.lock().truncate()?;

        Ok(())
    }

    /// Every record in key order
    ///
    /// Sequential scan for integrity checks; holds the write lock so the
    /// result is a consistent snapshot.
    pub fn records(&self) -> Result<Vec<StringRecord>> {
        let _write_guard = self.write_lock.lock();

        let mut records = Vec::with_capacity(self.count() as usize);
        for table in self.storage.scan()? {
            for item in table {
                let (key, value) = item?;
                records.push(StringRecord { key, value });
            }
        }
        records.extend(
            self.memtable
                .snapshot()
                .into_iter()
                .map(|(key, value)| StringRecord { key, value }),
        );

        Ok(records)
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        self.wal.lock().sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the store directory path
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_change(&self) -> SchemaChange {
        self.schema_change
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Key the next inserted record will receive
    pub fn next_key(&self) -> u64 {
        self.next_key.load(Ordering::SeqCst)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
