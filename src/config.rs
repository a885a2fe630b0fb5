//! Configuration for StringDB
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::BatchPolicy;
use crate::error::{Result, StringDbError};

/// Main configuration for a StringDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory holding one subdirectory per named store
    /// Internal structure:
    ///   {data_dir}/{store_name}/
    ///     ├── MANIFEST         (schema metadata)
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    /// Name of the store inside `data_dir`
    pub store_name: String,

    // -------------------------------------------------------------------------
    // Schema Configuration
    // -------------------------------------------------------------------------
    /// Schema version requested on open
    pub schema_version: u32,

    /// Create the secondary index over `value` during upgrade
    pub value_index: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Fill Configuration
    // -------------------------------------------------------------------------
    /// Length of every generated string
    pub string_length: usize,

    /// How a deficit is split into batches
    pub batch_policy: BatchPolicy,

    /// Max batches submitted but not yet acknowledged
    pub max_in_flight: usize,

    /// How long to wait for a batch acknowledgment (milliseconds, 0 = forever)
    pub ack_timeout_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stringdb_data"),
            store_name: "stringDB".to_string(),
            schema_version: 1,
            value_index: false,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 16 },
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            string_length: 100,
            batch_policy: BatchPolicy::default(),
            max_in_flight: 8,
            ack_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding this store's files
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join(&self.store_name)
    }

    /// Acknowledgment timeout, `None` when waits are unbounded
    pub fn ack_timeout(&self) -> Option<Duration> {
        (self.ack_timeout_ms > 0).then(|| Duration::from_millis(self.ack_timeout_ms))
    }

    /// Reject settings no store could run with
    pub fn validate(&self) -> Result<()> {
        if self.store_name.is_empty() || Path::new(&self.store_name).components().count() != 1 {
            return Err(StringDbError::Config(format!(
                "store name must be a single path component, got {:?}",
                self.store_name
            )));
        }
        if self.schema_version == 0 {
            return Err(StringDbError::Config("schema version must be at least 1".into()));
        }
        if self.string_length == 0 {
            return Err(StringDbError::Config("string length must be positive".into()));
        }
        if self.max_in_flight == 0 {
            return Err(StringDbError::Config("max_in_flight must be positive".into()));
        }
        self.batch_policy.validate()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all stores)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the store name
    pub fn store_name(mut self, name: impl Into<String>) -> Self {
        self.config.store_name = name.into();
        self
    }

    /// Set the schema version requested on open
    pub fn schema_version(mut self, version: u32) -> Self {
        self.config.schema_version = version;
        self
    }

    /// Create the `value` index during upgrade
    pub fn value_index(mut self, enabled: bool) -> Self {
        self.config.value_index = enabled;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the generated string length
    pub fn string_length(mut self, length: usize) -> Self {
        self.config.string_length = length;
        self
    }

    /// Set the batching policy
    pub fn batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.config.batch_policy = policy;
        self
    }

    /// Set the number of unacknowledged batches allowed
    pub fn max_in_flight(mut self, count: usize) -> Self {
        self.config.max_in_flight = count;
        self
    }

    /// Set the acknowledgment timeout (in milliseconds)
    pub fn ack_timeout_ms(mut self, ms: u64) -> Self {
        self.config.ack_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.string_length, 100);
        assert_eq!(config.schema_version, 1);
        assert!(config.store_dir().ends_with("stringDB"));
    }

    #[test]
    fn test_rejects_nested_store_name() {
        let config = Config::builder().store_name("a/b").build();
        assert!(matches!(config.validate(), Err(StringDbError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_means_unbounded() {
        let config = Config::builder().ack_timeout_ms(0).build();
        assert_eq!(config.ack_timeout(), None);
    }
}
