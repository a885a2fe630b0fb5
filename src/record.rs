//! Record types shared by the store and the filler.

use serde::{Deserialize, Serialize};

/// A stored string with its store-assigned key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRecord {
    pub key: u64,
    pub value: String,
}

/// Keys assigned to one inserted batch: `first..first + len`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub first: u64,
    pub len: u64,
}

impl KeyRange {
    pub fn new(first: u64, len: u64) -> Self {
        Self { first, len }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Last key in the range, `None` when empty
    pub fn last(&self) -> Option<u64> {
        (self.len > 0).then(|| self.first + self.len - 1)
    }

    pub fn keys(&self) -> std::ops::Range<u64> {
        self.first..self.first + self.len
    }
}
