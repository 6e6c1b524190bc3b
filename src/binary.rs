//! Binary payloads.
//!
//! A [`Blob`] wraps a byte payload behind an `Arc`, so documents flowing out
//! of a cursor share one backing buffer instead of copying potentially large
//! media per result. `find_one` hands out the same bytes eagerly via
//! [`Blob::as_bytes`].
//!
//! At the insert boundary a string value that names a readable file on the
//! host filesystem is coerced into a blob holding that file's contents; once
//! stored, the value is unambiguously bytes.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Byte payload stored verbatim in a document.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Blob(Arc<Vec<u8>>);

impl Blob {
    /// Wraps a byte vector.
    pub fn new(bytes: Vec<u8>) -> Self {
        Blob(Arc::new(bytes))
    }

    /// Borrows the payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Copies the payload out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a file into a blob, if `candidate` names a readable file.
    ///
    /// Returns `None` when the string does not point at a file; read errors
    /// on an existing file also yield `None` so an unreadable path degrades
    /// to a plain string value.
    pub fn from_file_path(candidate: &str) -> Option<Self> {
        let path = Path::new(candidate);
        if !path.is_file() {
            return None;
        }
        std::fs::read(path).ok().map(Blob::new)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob::new(bytes)
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Blob::new(bytes.to_vec())
    }
}
