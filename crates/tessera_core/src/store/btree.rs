//! Snapshot-persisted B-tree engine.
//!
//! Maps live in ordered in-process tables. A commit writes every table into
//! one snapshot file, replacing the previous snapshot atomically:
//!
//! ```text
//! magic "TSRB" | version u16 | map count u32
//! per map:   name (u16 len) | entry count u64
//! per entry: key (u32 len) | value (u32 len)
//! crc32 of everything above
//! ```
//!
//! A crash at any point leaves the last committed snapshot intact.

use super::frame::{put_blob, put_name, put_u16, put_u32, put_u64, ByteReader};
use super::table::{Change, Table, Tracker};
use super::{BackendMap, StorageEngine};
use crate::config::EngineKind;
use crate::error::{CoreError, CoreResult};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_storage::write_atomically;
use tracing::debug;

const SNAPSHOT_MAGIC: [u8; 4] = *b"TSRB";
const SNAPSHOT_VERSION: u16 = 1;

type Tables = BTreeMap<String, Arc<Table>>;

/// Engine persisting ordered tables as a checksummed snapshot file.
#[derive(Debug)]
pub struct BTreeEngine {
    path: PathBuf,
    read_only: bool,
    tables: RwLock<Tables>,
    dirty: Arc<AtomicBool>,
    open: AtomicBool,
    commit_lock: Mutex<()>,
}

impl BTreeEngine {
    /// Creates an engine for the snapshot file at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, read_only: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            read_only,
            tables: RwLock::new(BTreeMap::new()),
            dirty: Arc::new(AtomicBool::new(false)),
            open: AtomicBool::new(false),
            commit_lock: Mutex::new(()),
        }
    }

    /// Returns the snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tracker(&self) -> Tracker {
        Tracker::Dirty(Arc::clone(&self.dirty))
    }

    fn encode(tables: &Tables) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        put_u16(&mut buf, SNAPSHOT_VERSION);
        let count = u32::try_from(tables.len())
            .map_err(|_| CoreError::invalid_operation("too many maps for one snapshot"))?;
        put_u32(&mut buf, count);

        for (name, table) in tables {
            let entries = table.snapshot();
            put_name(&mut buf, name)?;
            put_u64(&mut buf, entries.len() as u64);
            for (key, value) in &entries {
                put_blob(&mut buf, key)?;
                put_blob(&mut buf, value)?;
            }
        }

        let crc = crc32fast::hash(&buf);
        put_u32(&mut buf, crc);
        Ok(buf)
    }

    fn decode(&self, data: &[u8]) -> CoreResult<Tables> {
        let truncated = || CoreError::corruption("snapshot is truncated");

        if data.len() < SNAPSHOT_MAGIC.len() + 2 + 4 + 4 || data[..4] != SNAPSHOT_MAGIC {
            return Err(CoreError::corruption(format!(
                "{} is not a btree store file",
                self.path.display()
            )));
        }
        let (body, stored_crc) = data.split_at(data.len() - 4);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(stored_crc);
        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(CoreError::corruption(format!(
                "snapshot checksum mismatch: expected {expected:08x}, got {actual:08x}"
            )));
        }

        let mut reader = ByteReader::new(&body[4..]);
        let version = reader.u16().ok_or_else(truncated)?;
        if version != SNAPSHOT_VERSION {
            return Err(CoreError::corruption(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let mut tables = BTreeMap::new();
        let count = reader.u32().ok_or_else(truncated)?;
        for _ in 0..count {
            let name = reader.name().ok_or_else(truncated)?.to_string();
            let entry_count = reader.u64().ok_or_else(truncated)?;
            let mut entries = BTreeMap::new();
            for _ in 0..entry_count {
                let key = reader.blob().ok_or_else(truncated)?;
                let value = reader.blob().ok_or_else(truncated)?;
                entries.insert(key.to_vec(), value.to_vec());
            }
            let table = Table::with_entries(&name, entries, self.tracker());
            tables.insert(name, Arc::new(table));
        }
        if !reader.is_empty() {
            return Err(CoreError::corruption("trailing bytes after snapshot"));
        }
        Ok(tables)
    }
}

impl StorageEngine for BTreeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::BTree
    }

    fn open(&self) -> CoreResult<()> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !self.read_only => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let tables = if data.is_empty() {
            BTreeMap::new()
        } else {
            self.decode(&data)?
        };
        debug!(path = %self.path.display(), maps = tables.len(), "loaded snapshot");
        *self.tables.write() = tables;
        self.dirty.store(false, Ordering::Release);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    fn open_map(&self, name: &str) -> CoreResult<Arc<dyn BackendMap>> {
        let mut tables = self.tables.write();
        if !tables.contains_key(name) {
            tables.insert(
                name.to_string(),
                Arc::new(Table::new(name, self.tracker())),
            );
            self.dirty.store(true, Ordering::Release);
        }
        match tables.get(name) {
            Some(table) => Ok(Arc::clone(table) as Arc<dyn BackendMap>),
            None => Err(CoreError::illegal_state(format!("map {name} vanished"))),
        }
    }

    fn has_map(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    fn map_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    fn drop_map(&self, name: &str) -> CoreResult<()> {
        if let Some(table) = self.tables.write().remove(name) {
            table.apply(Change::Drop);
            self.dirty.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        if self.read_only {
            return Ok(());
        }
        let _serialized = self.commit_lock.lock();
        // a snapshot taken after close would hold no maps
        if !self.open.load(Ordering::Acquire) {
            return Err(CoreError::StoreClosed);
        }
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let written = Self::encode(&self.tables.read())
            .and_then(|data| Ok(write_atomically(&self.path, &data).map(|()| data.len())?));
        match written {
            Ok(bytes) => {
                debug!(path = %self.path.display(), bytes, "snapshot committed");
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    fn close(&self) -> CoreResult<()> {
        let _serialized = self.commit_lock.lock();
        self.open.store(false, Ordering::Release);
        self.tables.write().clear();
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }
}
