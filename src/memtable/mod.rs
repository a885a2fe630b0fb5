//! MemTable Module
//!
//! In-memory data structure for recently inserted records.
//!
//! ## Responsibilities
//! - Hold records written to the WAL but not yet flushed
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation
//!
//! ## Data Structure Choice
//! BTreeMap keyed by record key wrapped in RwLock:
//! - Keys are allocated in increasing order, so inserts append at the end
//! - Ordered iteration is exactly the order an SSTable needs
//! - Records are never deleted, so no tombstones are required

mod table;

pub use table::MemTable;
