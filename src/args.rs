//! CLI argument definitions shared by the binaries.

use std::path::PathBuf;

use clap::Args;

use crate::batch::BatchPolicy;
use crate::config::{Config, WalSyncStrategy};

/// Store and fill settings
#[derive(Args, Clone, Debug)]
pub struct StoreArgs {
    /// Data directory
    #[arg(short, long, env = "STRINGDB_DATA_DIR", default_value = "./stringdb_data")]
    pub data_dir: PathBuf,

    /// Store name inside the data directory
    #[arg(long, env = "STRINGDB_STORE", default_value = "stringDB")]
    pub store: String,

    /// Schema version to open the store at
    #[arg(long, default_value = "1")]
    pub schema_version: u32,

    /// Create the secondary index over values during upgrade
    #[arg(long)]
    pub value_index: bool,

    /// Length of every generated string
    #[arg(long, default_value = "100")]
    pub string_length: usize,

    /// Records per batch (ignored when --batch-count is given)
    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    /// Split every deficit into this many batches instead
    #[arg(long)]
    pub batch_count: Option<usize>,

    /// Batches submitted but not yet acknowledged
    #[arg(long, default_value = "8")]
    pub max_in_flight: usize,

    /// Batch acknowledgment timeout in milliseconds (0 = wait forever)
    #[arg(long, default_value = "30000")]
    pub ack_timeout_ms: u64,

    /// fsync the WAL after every batch
    #[arg(long)]
    pub sync_every_write: bool,

    /// MemTable size limit in MB before flush
    #[arg(short = 'm', long, default_value = "4")]
    pub memtable_mb: usize,
}

impl StoreArgs {
    pub fn to_config(&self) -> Config {
        let batch_policy = match self.batch_count {
            Some(batches) => BatchPolicy::FixedCount { batches },
            None => BatchPolicy::FixedSize {
                size: self.batch_size,
            },
        };

        let mut builder = Config::builder()
            .data_dir(&self.data_dir)
            .store_name(&self.store)
            .schema_version(self.schema_version)
            .value_index(self.value_index)
            .string_length(self.string_length)
            .batch_policy(batch_policy)
            .max_in_flight(self.max_in_flight)
            .ack_timeout_ms(self.ack_timeout_ms)
            .memtable_size_limit(self.memtable_mb * 1024 * 1024);

        if self.sync_every_write {
            builder = builder.wal_sync_strategy(WalSyncStrategy::EveryWrite);
        }

        builder.build()
    }
}

/// Install the tracing subscriber used by both binaries (logs go to stderr)
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stringdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();
}
