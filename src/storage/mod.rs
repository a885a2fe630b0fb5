//! Storage Module
//!
//! Persistent record storage using an SSTable-like format.
//!
//! ## Responsibilities
//! - Persist flushed records to disk in key order
//! - Report record counts and the highest persisted key
//! - Sequential scans for integrity checks
//!
//! See `sstable` for the file format.

mod sstable;
mod manager;

pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
pub use manager::StorageManager;
