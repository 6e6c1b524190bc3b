//! Document identifiers.
//!
//! An [`ObjectId`] is a 12-byte value laid out as:
//!
//! ```text
//! +---------------+-----------------+-------------+
//! | 4 bytes       | 5 bytes         | 3 bytes     |
//! | BE unix secs  | process random  | BE counter  |
//! +---------------+-----------------+-------------+
//! ```
//!
//! The random middle section is chosen once per process; the trailing
//! counter increments atomically per generated id, so ids created in the
//! same second by the same process remain distinct. The canonical printable
//! form is 24 lowercase hex digits.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Per-process random section, chosen once.
static PROCESS_RANDOM: Lazy<[u8; 5]> = Lazy::new(|| {
    use rand::RngCore;
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
});

/// Monotonic counter, randomly seeded so ids don't start at zero after
/// every process restart.
static COUNTER: Lazy<AtomicU32> = Lazy::new(|| {
    use rand::Rng;
    AtomicU32::new(rand::thread_rng().gen())
});

/// Unique document identifier with an embedded creation timestamp.
///
/// # Examples
///
/// ```
/// use mainydb::oid::ObjectId;
///
/// let id = ObjectId::new();
/// let hex = id.to_string();
/// assert_eq!(hex.len(), 24);
///
/// let parsed: ObjectId = hex.parse()?;
/// assert_eq!(parsed, id);
/// # Ok::<(), mainydb::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generates a fresh identifier. Thread-safe.
    pub fn new() -> Self {
        let secs = chrono::Utc::now().timestamp().max(0) as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_RANDOM);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    /// Wraps 12 raw bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    /// Parses an identifier from 24 hex digits (any case).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] for any other input.
    pub fn parse_str(input: &str) -> Result<Self> {
        if input.len() != 24 {
            return Err(Error::InvalidId(format!(
                "expected 24 hex digits, got {} characters",
                input.len()
            )));
        }
        let raw = hex::decode(input)
            .map_err(|e| Error::InvalidId(format!("invalid hex in '{}': {}", input, e)))?;
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&raw);
        Ok(ObjectId(bytes))
    }

    /// Parses an identifier from a raw byte slice (must be exactly 12 bytes).
    pub fn parse_bytes(input: &[u8]) -> Result<Self> {
        if input.len() != 12 {
            return Err(Error::InvalidId(format!(
                "expected 12 bytes, got {}",
                input.len()
            )));
        }
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(input);
        Ok(ObjectId(bytes))
    }

    /// Returns the raw 12 bytes.
    pub fn bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Returns the creation time embedded in the identifier, as unix seconds.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectId::parse_str(s)
    }
}
