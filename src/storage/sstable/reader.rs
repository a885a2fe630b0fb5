//! SSTable Reader
//!
//! Opens SSTable files, validates them, and hands out record iterators.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Result, StringDbError};

use super::iterator::SSTableIterator;
use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for an SSTable file
pub struct SSTableReader {
    path: PathBuf,
    entry_count: u64,
    min_key: u64,
    max_key: u64,
    /// Offset where the footer starts (end of data block)
    data_end: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates the header and the data block checksum.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(StringDbError::Storage(format!(
                "SSTable {} too small: {} bytes",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(StringDbError::Storage(format!(
                "Invalid SSTable magic: expected STDB, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(StringDbError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = le_u64(&header[6..14]);
        let min_key = le_u64(&header[14..22]);
        let max_key = le_u64(&header[22..30]);

        let data_end = file_size - FOOTER_SIZE;

        // Checksum the data block
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = data_end - HEADER_SIZE;
        let mut chunk = vec![0u8; 64 * 1024];
        let mut reader = BufReader::new(&mut file);
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            reader.read_exact(&mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }

        let mut footer = [0u8; FOOTER_SIZE as usize];
        reader.read_exact(&mut footer)?;
        let stored_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);

        if hasher.finalize() != stored_crc {
            return Err(StringDbError::Storage(format!(
                "SSTable {} failed checksum",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            entry_count,
            min_key,
            max_key,
            data_end,
        })
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Smallest key, `None` for an empty table
    pub fn min_key(&self) -> Option<u64> {
        (self.entry_count > 0).then_some(self.min_key)
    }

    /// Largest key, `None` for an empty table
    pub fn max_key(&self) -> Option<u64> {
        (self.entry_count > 0).then_some(self.max_key)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate over all records in key order
    ///
    /// Opens its own file handle, so several scans may run at once.
    pub fn iter(&self) -> Result<SSTableIterator> {
        let mut file = BufReader::new(File::open(&self.path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(SSTableIterator::new(file, self.data_end))
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
