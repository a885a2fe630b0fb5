//! # StringDB
//!
//! A persistent record store that tops itself up to a target number of
//! fixed-length random printable strings:
//! - Schema created on first open, upgraded when a newer version is requested
//! - Write-Ahead Logging (WAL) with one entry per batch
//! - Crash recovery with partial write handling
//! - Resumable fill: the deficit is computed against the live count
//! - Progress events over a control channel
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Control Channel / Worker                     │
//! │          (Start { target } in, progress events out)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Batch Filler                             │
//! │     count → deficit → batches → RandomStringSource           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ insert_batch (pipelined)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │             Record Store (single writer thread)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │  (RwLock)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTable)  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod schema;
pub mod record;
pub mod engine;
pub mod store;

pub mod source;
pub mod batch;
pub mod filler;
pub mod control;

pub mod args;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StringDbError, Result};
pub use config::Config;
pub use engine::Engine;
pub use record::{KeyRange, StringRecord};
pub use store::{BatchTicket, RecordStore, StoreEvent};
pub use source::{EntropySource, OsEntropy, RandomStringSource};
pub use batch::BatchPolicy;
pub use filler::{BatchFiller, BatchStore, CancellationToken, FillOptions, FillProgress, FillReport, FillState};
pub use control::{ControlMessage, FillTarget, StartCommand, Worker, WorkerEvent, WorkerHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StringDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
