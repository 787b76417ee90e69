//! Error types for the index.

use thiserror::Error as ThisError;

use crate::common::{BlockOffset, Key};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the index.
///
/// Variants fall into three groups:
/// - configuration errors, reported by `open` before any file is touched
/// - logical errors ([`Error::DuplicateKey`], [`Error::KeyNotFound`]),
///   which leave the tree unchanged
/// - integrity and capacity violations, see [`Error::is_fatal`]
#[derive(Debug, ThisError)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Block size is not a power of two or cannot hold a minimal node.
    #[error("invalid block size {size}: {reason}")]
    InvalidBlockSize { size: usize, reason: &'static str },

    /// Index path exceeds the supported length.
    #[error("index path is {len} bytes, limit is {limit}")]
    PathTooLong { len: usize, limit: usize },

    /// Node cache configured below the minimum number of frames.
    #[error("node cache needs at least 5 frames, got {0}")]
    InvalidCacheSize(usize),

    /// Insert of a key that is already present.
    #[error("key {0} already exists")]
    DuplicateKey(Key),

    /// Lookup or removal of a key that is not present.
    #[error("key {0} not found")]
    KeyNotFound(Key),

    /// Every node buffer is in use.
    #[error("node cache exhausted: all {0} frames in use")]
    CacheExhausted(usize),

    /// A block was bound to two buffers at once.
    #[error("{0} is already resident in another frame")]
    AliasedBlock(BlockOffset),

    /// The index file ended before a full block could be read.
    #[error("short read at {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: BlockOffset,
        expected: usize,
        actual: usize,
    },

    /// A block's stored checksum does not match its contents.
    #[error("{0} failed checksum verification")]
    ChecksumMismatch(BlockOffset),

    /// A node's contents contradict the tree structure.
    #[error("corrupt node at {offset}: {reason}")]
    CorruptNode {
        offset: BlockOffset,
        reason: &'static str,
    },

    /// The boot record could not be decoded.
    #[error("corrupt boot record: {0}")]
    CorruptBoot(String),

    /// `verify` found a broken structural invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// An earlier fatal error left the tree possibly half-updated.
    #[error("tree handle poisoned by an earlier fatal error")]
    Poisoned,
}

impl Error {
    /// Whether this error signals a capacity or integrity violation.
    ///
    /// After a fatal error the on-disk tree may be half-updated; the
    /// handle should be dropped rather than used further.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::DuplicateKey(_)
                | Error::KeyNotFound(_)
                | Error::InvalidBlockSize { .. }
                | Error::PathTooLong { .. }
                | Error::InvalidCacheSize(_)
        )
    }

    pub(crate) fn corrupt(offset: BlockOffset, reason: &'static str) -> Self {
        Error::CorruptNode { offset, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::KeyNotFound(42);
        assert_eq!(format!("{}", err), "key 42 not found");

        let err = Error::CacheExhausted(5);
        assert_eq!(
            format!("{}", err),
            "node cache exhausted: all 5 frames in use"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::DuplicateKey(1).is_fatal());
        assert!(!Error::KeyNotFound(1).is_fatal());
        assert!(!Error::InvalidCacheSize(2).is_fatal());
        assert!(Error::CacheExhausted(5).is_fatal());
        assert!(Error::ChecksumMismatch(BlockOffset::new(0)).is_fatal());
        assert!(Error::Poisoned.is_fatal());
        assert!(Error::ShortRead {
            offset: BlockOffset::new(0),
            expected: 128,
            actual: 0,
        }
        .is_fatal());
    }
}
