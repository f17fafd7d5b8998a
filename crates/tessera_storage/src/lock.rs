//! Advisory locks guarding a physical store location.
//!
//! A writer holds an exclusive lock on `<store file>.lock`; read-only opens
//! take a shared lock so any number of readers can coexist while no writer
//! is active. The lock is released when the [`StoreLock`] is dropped.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock mode requested for a store location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Single writer.
    Exclusive,
    /// Many readers, no writer.
    Shared,
}

/// A held lock on a store location.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    mode: LockMode,
    _file: File,
}

impl StoreLock {
    /// Returns the lock file path used for the store at `store_path`.
    #[must_use]
    pub fn lock_path(store_path: &Path) -> PathBuf {
        let mut name = store_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        store_path.with_file_name(name)
    }

    /// Tries to lock the store at `store_path` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if a conflicting lock is held,
    /// including one held by another handle in this process.
    pub fn acquire(store_path: &Path, mode: LockMode) -> StorageResult<Self> {
        let path = Self::lock_path(store_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let locked = match mode {
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            LockMode::Shared => FileExt::try_lock_shared(&file),
        };
        if locked.is_err() {
            return Err(StorageError::Locked { path });
        }

        Ok(Self {
            path,
            mode,
            _file: file,
        })
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the held mode.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}
