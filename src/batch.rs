//! Batching Policy
//!
//! Splits a deficit into batch sizes. Sizes always sum to the deficit and
//! empty batches are never produced.

use crate::error::{Result, StringDbError};

/// Default number of records per batch for `BatchPolicy::FixedSize`
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Batch count used by `BatchPolicy::FixedCount` in its reference setting
pub const REFERENCE_BATCH_COUNT: usize = 1000;

/// How a deficit is divided into units of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Constant number of batches regardless of deficit.
    ///
    /// Sizes differ by at most one; the remainder goes to the first batches.
    /// When the deficit is smaller than `batches` only `deficit` batches of
    /// one record are produced (the rest would be empty).
    FixedCount { batches: usize },

    /// Constant batch size; the batch count grows with the deficit.
    FixedSize { size: usize },
}

impl Default for BatchPolicy {
    fn default() -> Self {
        BatchPolicy::FixedSize {
            size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BatchPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            BatchPolicy::FixedCount { batches: 0 } => {
                Err(StringDbError::Config("batch count must be positive".into()))
            }
            BatchPolicy::FixedSize { size: 0 } => {
                Err(StringDbError::Config("batch size must be positive".into()))
            }
            _ => Ok(()),
        }
    }

    /// Lazily yield batch sizes for `deficit` records
    pub fn partition(&self, deficit: u64) -> BatchPlan {
        let (count, base, remainder) = match *self {
            BatchPolicy::FixedCount { batches } => {
                let batches = batches.max(1) as u64;
                (batches.min(deficit), deficit / batches, deficit % batches)
            }
            BatchPolicy::FixedSize { size } => {
                let size = size.max(1) as u64;
                let full = deficit / size;
                let tail = deficit % size;
                return BatchPlan {
                    next: 0,
                    count: full + u64::from(tail > 0),
                    base: size,
                    remainder: 0,
                    tail,
                };
            }
        };

        BatchPlan {
            next: 0,
            count,
            base,
            remainder,
            tail: 0,
        }
    }
}

/// Iterator over batch sizes
#[derive(Debug, Clone)]
pub struct BatchPlan {
    next: u64,
    count: u64,
    base: u64,
    /// First `remainder` batches carry one extra record
    remainder: u64,
    /// Size of the final batch when it is partial (0 = not partial)
    tail: u64,
}

impl BatchPlan {
    /// Total number of batches in the plan
    pub fn batch_count(&self) -> u64 {
        self.count
    }
}

impl Iterator for BatchPlan {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let size = if self.tail > 0 && index + 1 == self.count {
            self.tail
        } else if index < self.remainder {
            self.base + 1
        } else {
            self.base
        };
        Some(size as usize)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for BatchPlan {}
