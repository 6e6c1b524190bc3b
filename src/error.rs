/// Error types for the mainydb library
use std::fmt;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for database operations
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed document identifier (not 12 bytes / 24 hex digits)
    InvalidId(String),

    /// Insert with an `_id` already present in the collection
    DuplicateId(String),

    /// Operator misuse: unknown operator or stage, malformed operator
    /// document, mixed inclusion/exclusion projection, bad index spec
    BadQuery(String),

    /// Regular expression compilation failure
    BadRegex(String),

    /// Update operator applied to an incompatible value kind
    TypeMismatch(String),

    /// Positional `$` path without a captured array match index
    MissingField(String),

    /// AES-256 requested but the cipher stack is not compiled in
    CryptoUnavailable(String),

    /// Snapshot deserialization failure at load
    CorruptStore(String),

    /// Underlying file read/write failure
    Io(String),

    /// Strict-mode access to a collection that does not exist
    UnknownCollection(String),

    /// Bulk write aborted; carries the partial tally and the failing step
    BulkWrite(Box<BulkWriteFailure>),
}

/// Partial outcome of a failed bulk write.
///
/// Bulk operations stop at the first failing step; the counts reflect every
/// step that completed before the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteFailure {
    /// Index of the operation that failed, in submission order
    pub index: usize,
    /// Documents inserted before the failure
    pub inserted_count: u64,
    /// Documents modified before the failure
    pub modified_count: u64,
    /// Documents deleted before the failure
    pub deleted_count: u64,
    /// Documents upserted before the failure
    pub upserted_count: u64,
    /// The error that stopped the batch
    pub source: Error,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidId(msg) => write!(f, "Invalid identifier: {}", msg),
            Error::DuplicateId(msg) => write!(f, "Duplicate _id: {}", msg),
            Error::BadQuery(msg) => write!(f, "Bad query: {}", msg),
            Error::BadRegex(msg) => write!(f, "Bad regex: {}", msg),
            Error::TypeMismatch(msg) => write!(f, "Type mismatch: {}", msg),
            Error::MissingField(msg) => write!(f, "Missing field: {}", msg),
            Error::CryptoUnavailable(msg) => write!(f, "Crypto unavailable: {}", msg),
            Error::CorruptStore(msg) => write!(f, "Corrupt store: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
            Error::UnknownCollection(msg) => write!(f, "Unknown collection: {}", msg),
            Error::BulkWrite(failure) => write!(
                f,
                "Bulk write aborted at operation {}: {}",
                failure.index, failure.source
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = Error::BadQuery("unknown operator $frob".to_string());
        assert_eq!(err.to_string(), "Bad query: unknown operator $frob");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_bulk_write_failure_carries_partial_tally() {
        let failure = BulkWriteFailure {
            index: 3,
            inserted_count: 2,
            modified_count: 1,
            deleted_count: 0,
            upserted_count: 0,
            source: Error::DuplicateId("abc".to_string()),
        };
        let err = Error::BulkWrite(Box::new(failure));
        let text = err.to_string();
        assert!(text.contains("operation 3"));
        assert!(text.contains("Duplicate _id"));
    }
}
