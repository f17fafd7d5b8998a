//! Value compression capability.
//!
//! The storage engine compresses map values through a [`Compressor`] when a
//! store is configured with compression. The algorithm is a strategy: the
//! engine only ever sees this trait.

use crate::error::{StorageError, StorageResult};

/// A reversible byte transform applied to stored values.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Short stable identifier recorded in store metadata.
    fn name(&self) -> &'static str;

    /// Compresses `data`.
    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>>;

    /// Reverses [`compress`](Self::compress).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Compression`] if `data` was not produced by
    /// this compressor or is damaged.
    fn decompress(&self, data: &[u8]) -> StorageResult<Vec<u8>>;
}

/// LZ4 block compression with the uncompressed size prepended.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

impl Lz4Compressor {
    /// Identifier written to store metadata.
    pub const NAME: &'static str = "lz4";

    /// Creates the compressor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| StorageError::Compression(e.to_string()))
    }
}
