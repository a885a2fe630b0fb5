//! SSTable Module
//!
//! Sorted String Table - immutable on-disk record storage sorted by key.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (30 bytes)                                       │
//! │   Magic: "STDB" (4) | Version: u16 (2) | Count: u64 (8) │
//! │   MinKey: u64 (8) | MaxKey: u64 (8)                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [Key: u64][ValLen: u32][Value]                        │
//! │   ... repeated for each record, keys ascending ...      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                        │
//! │   DataCRC: u32 (4) | Padding (4)                        │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a StringDB SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"STDB";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Count (8) + MinKey (8) + MaxKey (8)
pub(crate) const HEADER_SIZE: u64 = 30;

/// Footer size: DataCRC (4) + Padding (4)
pub(crate) const FOOTER_SIZE: u64 = 8;

/// Per-record framing: Key (8) + ValLen (4)
pub(crate) const RECORD_HEADER_SIZE: usize = 12;

// =============================================================================
// SSTable Metadata
// =============================================================================

/// SSTable metadata returned when a table is written
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of records in this SSTable
    pub entry_count: u64,
    /// Smallest key
    pub min_key: u64,
    /// Largest key
    pub max_key: u64,
    /// File size in bytes
    pub file_size: u64,
}
