//! Byte-store backend trait.

use crate::error::StorageResult;

/// An append-oriented byte store.
///
/// Backends know nothing about the records written into them: the log engine
/// in `tessera_core` owns the record framing and recovery rules, a backend
/// only has to hand back the exact bytes that were appended.
///
/// # Invariants
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, everything appended so far survives a crash
/// - `replace` swaps the whole content in one step; a crash leaves either the
///   old or the new content, never a mix
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range extends beyond the current size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the store to `new_size` bytes.
    ///
    /// Used to cut off a torn tail found during recovery.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire content with `data`.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Reads the full content.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("storage of {size} bytes does not fit in memory"),
            )
        })?;
        self.read_at(0, len)
    }
}
