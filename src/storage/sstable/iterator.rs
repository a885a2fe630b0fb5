//! SSTable Iterator
//!
//! Sequential iteration over all records in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read};

use crate::error::{Result, StringDbError};

use super::{HEADER_SIZE, RECORD_HEADER_SIZE};

/// Iterator over SSTable records in ascending key order
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Stop reading when we reach this offset (start of footer)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
}

impl SSTableIterator {
    /// `file` must already be positioned at the start of the data block
    pub(super) fn new(file: BufReader<File>, end_offset: u64) -> Self {
        Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
        }
    }

    fn read_record(&mut self) -> Result<(u64, String)> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        self.file.read_exact(&mut header)?;

        let mut key = [0u8; 8];
        key.copy_from_slice(&header[0..8]);
        let key = u64::from_le_bytes(key);
        let val_len = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;

        let mut value = vec![0u8; val_len];
        self.file.read_exact(&mut value)?;

        self.current_offset += (RECORD_HEADER_SIZE + val_len) as u64;

        let value = String::from_utf8(value).map_err(|e| {
            StringDbError::Storage(format!("record {} is not valid UTF-8: {}", key, e))
        })?;

        Ok((key, value))
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_offset >= self.end_offset {
            return None;
        }

        match self.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                // Do not keep reading from an unknown position
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}
