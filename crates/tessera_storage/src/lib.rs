//! # Tessera Storage
//!
//! The lowest layer of Tessera: opaque byte stores, the value compression
//! capability and advisory locks for store locations.
//!
//! Nothing here interprets stored bytes. The storage engines in
//! `tessera_core` own record framing, snapshots and recovery.
//!
//! ## Available pieces
//!
//! - [`InMemoryBackend`] - volatile byte store, clones share one buffer
//! - [`FileBackend`] - persistent byte store on a single file
//! - [`Lz4Compressor`] - default [`Compressor`] for compressed stores
//! - [`StoreLock`] - single-writer / many-reader file lock
//!
//! ## Example
//!
//! ```rust
//! use tessera_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod compress;
mod error;
mod file;
mod lock;
mod memory;

pub use backend::StorageBackend;
pub use compress::{Compressor, Lz4Compressor};
pub use error::{StorageError, StorageResult};
pub use file::{write_atomically, FileBackend};
pub use lock::{LockMode, StoreLock};
pub use memory::InMemoryBackend;
