//! Random String Source
//!
//! Produces fixed-length printable strings from a high-entropy byte source.
//! Each raw byte `b` maps to `char((b % 94) + 33)`, so every character lies
//! in the printable ASCII range `'!'..='~'`.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Result, StringDbError};

/// First printable code point (`'!'`)
pub const PRINTABLE_START: u8 = 33;

/// Number of printable characters in the alphabet (`'!'..='~'`)
pub const ALPHABET_SIZE: u8 = 94;

/// A source of raw random bytes
///
/// Implementations must draw from a non-deterministic source in production.
/// Tests substitute fixed or failing sources.
pub trait EntropySource: Send {
    /// Fill `dest` entirely or fail with `EntropyUnavailable`
    fn try_fill(&mut self, dest: &mut [u8]) -> Result<()>;
}

/// Operating system entropy (getrandom / `/dev/urandom` / BCryptGenRandom)
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn try_fill(&mut self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| StringDbError::EntropyUnavailable(e.to_string()))
    }
}

/// Generates printable strings from an entropy source
pub struct RandomStringSource<E = OsEntropy> {
    entropy: E,
    /// Reused scratch buffer for raw bytes
    scratch: Vec<u8>,
}

impl RandomStringSource<OsEntropy> {
    /// Source backed by the operating system RNG
    pub fn os() -> Self {
        Self::new(OsEntropy)
    }
}

impl<E: EntropySource> RandomStringSource<E> {
    pub fn new(entropy: E) -> Self {
        Self {
            entropy,
            scratch: Vec::new(),
        }
    }

    /// Generate one string of exactly `length` printable characters
    pub fn generate(&mut self, length: usize) -> Result<String> {
        if length == 0 {
            return Err(StringDbError::InvalidLength(length));
        }

        self.scratch.resize(length, 0);
        self.entropy.try_fill(&mut self.scratch)?;

        Ok(self.scratch.iter().map(|&b| to_printable(b)).collect())
    }

    /// Generate `count` strings, stopping at the first entropy failure
    pub fn generate_batch(&mut self, count: usize, length: usize) -> Result<Vec<String>> {
        (0..count).map(|_| self.generate(length)).collect()
    }
}

/// Map a raw byte onto the 94-character printable alphabet
#[inline]
pub fn to_printable(byte: u8) -> char {
    char::from(byte % ALPHABET_SIZE + PRINTABLE_START)
}

/// True if every character of `value` is in the printable alphabet
pub fn is_printable(value: &str) -> bool {
    value
        .bytes()
        .all(|b| (PRINTABLE_START..PRINTABLE_START + ALPHABET_SIZE).contains(&b))
}
