//! Write-Ahead Log
//!
//! Every inserted batch is appended here as a single frame before any of its
//! records become visible, so recovery replays a batch whole or drops it.
//!
//! ```text
//!  frame:  [ lsn: u64 ][ crc: u32 ][ len: u32 ][ bincode(WalEntry) ]
//!                        └── covers lsn, len and payload
//! ```
//!
//! The log only holds batches newer than the last SSTable flush; it is
//! truncated after every flush. A torn or corrupt frame ends the valid
//! prefix and `WalRecovery::recover` cuts the file back to it.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE};
pub use writer::WalWriter;
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};
