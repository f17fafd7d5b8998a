//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The backend was opened read-only and a write was attempted.
    #[error("storage is read-only")]
    ReadOnly,

    /// Another handle holds the lock for this location.
    #[error("storage location is locked: {}", path.display())]
    Locked {
        /// The lock file that could not be acquired.
        path: PathBuf,
    },

    /// Compressing or decompressing a value failed.
    #[error("compression error: {0}")]
    Compression(String),
}
