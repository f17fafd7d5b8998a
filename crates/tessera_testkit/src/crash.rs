//! Crash simulation.
//!
//! A [`CrashableBackend`] wraps a byte store and stops accepting writes
//! once a byte budget is spent, keeping whatever prefix of the last write
//! fit. Reopening the underlying store afterwards shows what a process
//! killed at that moment would leave behind.
//!
//! The file helpers damage a closed store in place.
//!
//! ## Usage
//!
//! ```rust
//! use tessera_core::store::{BackendMap, LogEngine, StorageEngine};
//! use tessera_storage::InMemoryBackend;
//! use tessera_testkit::crash::CrashableBackend;
//!
//! let bytes = InMemoryBackend::new();
//! let (backend, switch) = CrashableBackend::new(Box::new(bytes.clone()));
//! let engine = LogEngine::with_backend(Box::new(backend));
//! engine.open().unwrap();
//!
//! switch.crash_after(0);
//! engine.open_map("m").unwrap().put(b"k", b"v").unwrap();
//! assert!(engine.commit().is_err());
//! assert!(switch.has_crashed());
//! ```

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tessera_storage::{StorageBackend, StorageError, StorageResult};

/// Controls when a [`CrashableBackend`] fails.
#[derive(Debug)]
pub struct CrashSwitch {
    budget: AtomicU64,
    written: AtomicU64,
    crashed: AtomicBool,
}

impl CrashSwitch {
    fn new() -> Self {
        Self {
            budget: AtomicU64::new(u64::MAX),
            written: AtomicU64::new(0),
            crashed: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been written.
    pub fn crash_after(&self, bytes: u64) {
        let written = self.written.load(Ordering::SeqCst);
        self.budget
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Returns whether the simulated crash has happened.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Returns the bytes written through the backend so far.
    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }
}

fn crashed() -> StorageError {
    StorageError::Io(io::Error::other("simulated crash"))
}

/// A storage backend wrapper that can simulate crashes.
///
/// After the crash every mutating call fails; reads keep working so the
/// engine can still report what it saw.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    switch: Arc<CrashSwitch>,
}

impl CrashableBackend {
    /// Wraps `inner` and returns the switch controlling it.
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, Arc<CrashSwitch>) {
        let switch = Arc::new(CrashSwitch::new());
        (
            Self {
                inner,
                switch: Arc::clone(&switch),
            },
            switch,
        )
    }

    fn ensure_alive(&self) -> StorageResult<()> {
        if self.switch.has_crashed() {
            return Err(crashed());
        }
        Ok(())
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.ensure_alive()?;
        let written = self.switch.written.load(Ordering::SeqCst);
        let budget = self.switch.budget.load(Ordering::SeqCst);
        let room = budget.saturating_sub(written);

        if (data.len() as u64) <= room {
            let offset = self.inner.append(data)?;
            self.switch
                .written
                .fetch_add(data.len() as u64, Ordering::SeqCst);
            return Ok(offset);
        }

        // keep the prefix that fit, like a torn write
        let partial = usize::try_from(room).unwrap_or(usize::MAX).min(data.len());
        if partial > 0 {
            self.inner.append(&data[..partial])?;
        }
        self.switch.written.store(budget, Ordering::SeqCst);
        self.switch.crashed.store(true, Ordering::SeqCst);
        Err(crashed())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.ensure_alive()?;
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.ensure_alive()?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_alive()?;
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.ensure_alive()?;
        self.inner.replace(data)
    }
}

/// Cuts the last `bytes` bytes off the file at `path`.
pub fn truncate_tail(path: &Path, bytes: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}

/// Flips every bit of the byte at `offset` from the end of the file.
pub fn flip_byte_from_end(path: &Path, offset: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    let position = len
        .checked_sub(offset + 1)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset past file start"))?;
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(position))?;
    file.read_exact(&mut byte)?;
    byte[0] = !byte[0];
    file.seek(SeekFrom::Start(position))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Appends raw bytes to the file at `path`.
pub fn append_garbage(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
