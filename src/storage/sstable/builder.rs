//! SSTable Builder
//!
//! Writes key-ordered records to a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StringDbError};

use super::{SSTable, HEADER_SIZE, MAGIC, VERSION};

/// Builder for creating new SSTables from sorted records
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of records written
    entry_count: u64,
    /// Track min/max keys for metadata
    min_key: Option<u64>,
    max_key: Option<u64>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes a placeholder header immediately; call `add()` in ascending key
    /// order, then `finish()` to write the footer and the real header.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE as usize])?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entry_count: 0,
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add a record (keys must be strictly ascending)
    pub fn add(&mut self, key: u64, value: &str) -> Result<()> {
        if let Some(prev) = self.max_key {
            if key <= prev {
                return Err(StringDbError::Storage(format!(
                    "SSTable keys out of order: {} after {}",
                    key, prev
                )));
            }
        }

        let val_len = u32::try_from(value.len()).map_err(|_| {
            StringDbError::Storage(format!("record value too large: {} bytes", value.len()))
        })?;

        let key_bytes = key.to_le_bytes();
        let len_bytes = val_len.to_le_bytes();

        self.writer.write_all(&key_bytes)?;
        self.writer.write_all(&len_bytes)?;
        self.writer.write_all(value.as_bytes())?;

        self.data_hasher.update(&key_bytes);
        self.data_hasher.update(&len_bytes);
        self.data_hasher.update(value.as_bytes());

        self.min_key.get_or_insert(key);
        self.max_key = Some(key);
        self.entry_count += 1;

        Ok(())
    }

    /// Finish building: write footer, patch header, and return metadata
    pub fn finish(mut self) -> Result<SSTable> {
        let data_crc = self.data_hasher.finalize();

        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?; // Padding for alignment
        self.writer.flush()?;

        let mut file = self.writer.into_inner().map_err(|e| {
            StringDbError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;

        let min_key = self.min_key.unwrap_or_default();
        let max_key = self.max_key.unwrap_or_default();

        file.seek(SeekFrom::Start(0))?;
        file.write_all(MAGIC)?;
        file.write_all(&VERSION.to_le_bytes())?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.write_all(&min_key.to_le_bytes())?;
        file.write_all(&max_key.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key,
            max_key,
            file_size,
        })
    }
}
