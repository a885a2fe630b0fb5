//! Error types for StringDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StringDbError
pub type Result<T> = std::result::Result<T, StringDbError>;

/// Unified error type for StringDB operations
#[derive(Debug, Error)]
pub enum StringDbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to open store: {0}")]
    OpenFailed(String),

    #[error("Schema upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("Requested schema version {requested} is lower than stored version {existing}")]
    VersionError { requested: u32, existing: u32 },

    #[error("Store outdated, reload required (schema moved from v{old} to v{new})")]
    StoreOutdated { old: u32, new: u32 },

    #[error("Batch insert failed: {0}")]
    InsertFailed(String),

    // -------------------------------------------------------------------------
    // Generation Errors
    // -------------------------------------------------------------------------
    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Invalid string length: {0}")]
    InvalidLength(usize),

    // -------------------------------------------------------------------------
    // Fill Errors
    // -------------------------------------------------------------------------
    #[error("Invalid fill target: {0}")]
    InvalidTarget(String),

    #[error("Persistent storage unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Fill cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StringDbError {
    fn from(e: bincode::Error) -> Self {
        StringDbError::Serialization(e.to_string())
    }
}
