//! Log-structured engine.
//!
//! Every map lives in memory; changes are journaled and appended to a log
//! file as one batch per commit. Opening the store replays the log.
//!
//! ## File layout
//!
//! ```text
//! magic "TSRL" | version u16
//! record*: body len u32 | crc32(body) u32 | body
//! ```
//!
//! A body starts with its [`RecordType`] byte. Change records carry the map
//! name (u16 length) and, depending on the type, a key and a value (u32
//! lengths). A commit record carries the number of change records in its
//! batch.
//!
//! ## Recovery
//!
//! Only batches closed by a matching commit record are applied. Replay stops
//! at the first torn, damaged or unknown record; a writable engine then cuts
//! the file back to the end of the last complete batch.

use super::frame::{put_blob, put_name, put_u16, put_u32, ByteReader};
use super::table::{Change, Journal, Table, Tracker};
use super::{BackendMap, StorageEngine};
use crate::config::EngineKind;
use crate::error::{CoreError, CoreResult};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_storage::{FileBackend, StorageBackend};
use tracing::{debug, info, warn};

/// Magic bytes opening a log file.
pub const LOG_MAGIC: [u8; 4] = *b"TSRL";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const HEADER_SIZE: usize = 6;

/// Logs shorter than this are never compacted.
const COMPACTION_MIN_RECORDS: u64 = 1024;

/// Type of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A key was written.
    Put = 1,
    /// A key was removed.
    Remove = 2,
    /// A map was emptied (or created).
    Clear = 3,
    /// A map was dropped.
    Drop = 4,
    /// End of a committed batch.
    Commit = 5,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Remove),
            3 => Some(Self::Clear),
            4 => Some(Self::Drop),
            5 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

enum Record {
    Change(String, Change),
    Commit(u32),
}

type Tables = BTreeMap<String, Arc<Table>>;

/// Engine persisting maps as an append-only change log.
pub struct LogEngine {
    path: Option<PathBuf>,
    read_only: bool,
    backend: Mutex<Option<Box<dyn StorageBackend>>>,
    tables: RwLock<Tables>,
    journal: Journal,
    records: AtomicU64,
}

impl LogEngine {
    /// Creates an engine for the log file at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, read_only: bool) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            read_only,
            backend: Mutex::new(None),
            tables: RwLock::new(BTreeMap::new()),
            journal: Arc::default(),
            records: AtomicU64::new(0),
        }
    }

    /// Creates a writable engine over an already opened byte store.
    ///
    /// The engine owns the backend until it is closed and cannot be reopened
    /// afterwards.
    #[must_use]
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            path: None,
            read_only: false,
            backend: Mutex::new(Some(backend)),
            tables: RwLock::new(BTreeMap::new()),
            journal: Arc::default(),
            records: AtomicU64::new(0),
        }
    }

    /// Returns the number of records currently in the log.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Acquire)
    }

    fn open_backend(&self) -> CoreResult<Box<dyn StorageBackend>> {
        let Some(path) = &self.path else {
            return Err(CoreError::illegal_state(
                "log engine over a supplied backend cannot be reopened",
            ));
        };
        let backend = if self.read_only {
            FileBackend::open_read_only(path)?
        } else {
            FileBackend::open_with_create_dirs(path)?
        };
        Ok(Box::new(backend))
    }

    fn tracker(&self) -> Tracker {
        Tracker::Journal(Arc::clone(&self.journal))
    }

    fn live_entries(&self) -> u64 {
        self.tables
            .read()
            .values()
            .map(|t| t.len().unwrap_or(0) as u64)
            .sum()
    }

    /// Rebuilds the tables from the log and returns where the last complete
    /// batch ends.
    fn replay(&self, data: &[u8]) -> CoreResult<(Tables, usize, u64)> {
        let mut reader = ByteReader::new(data);
        let header_ok = reader.bytes(LOG_MAGIC.len()) == Some(&LOG_MAGIC[..]);
        if !header_ok {
            return Err(CoreError::corruption("file is not a tessera log"));
        }
        match reader.u16() {
            Some(LOG_VERSION) => {}
            Some(version) => {
                return Err(CoreError::corruption(format!(
                    "unsupported log version {version}"
                )))
            }
            None => return Err(CoreError::corruption("log header is truncated")),
        }

        let mut tables: Tables = BTreeMap::new();
        let mut pending: Vec<(String, Change)> = Vec::new();
        let mut committed_end = HEADER_SIZE;
        let mut records = 0u64;

        while !reader.is_empty() {
            let Some(record) = read_record(&mut reader) else {
                break;
            };
            match record {
                Record::Change(name, change) => pending.push((name, change)),
                Record::Commit(count) => {
                    if usize::try_from(count).ok() != Some(pending.len()) {
                        break;
                    }
                    records += u64::from(count) + 1;
                    for (name, change) in pending.drain(..) {
                        if change == Change::Drop {
                            tables.remove(&name);
                            continue;
                        }
                        tables
                            .entry(name.clone())
                            .or_insert_with(|| Arc::new(Table::new(&name, self.tracker())))
                            .apply(change);
                    }
                    committed_end = reader.position();
                }
            }
        }

        Ok((tables, committed_end, records))
    }

    /// Appends the pending batch and a commit record, then syncs.
    ///
    /// On failure the log is cut back and the journal is kept for a retry.
    fn flush(
        &self,
        journal: &mut Vec<(String, Change)>,
        backend: &mut dyn StorageBackend,
    ) -> CoreResult<()> {
        if journal.is_empty() {
            return Ok(());
        }
        let count = u32::try_from(journal.len())
            .map_err(|_| CoreError::invalid_operation("too many changes in one commit"))?;

        let mut batch = Vec::new();
        for (name, change) in journal.iter() {
            write_change(&mut batch, name, change)?;
        }
        write_commit(&mut batch, count)?;

        let size = backend.size()?;
        let written = backend.append(&batch).and_then(|_| backend.sync());
        if let Err(e) = written {
            if let Err(undo) = backend.truncate(size) {
                warn!(error = %undo, "failed to cut back a partial commit");
            }
            return Err(e.into());
        }

        self.records
            .fetch_add(u64::from(count) + 1, Ordering::AcqRel);
        debug!(changes = count, bytes = batch.len(), "log batch committed");
        journal.clear();
        Ok(())
    }
}

fn frame(buf: &mut Vec<u8>, body: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| CoreError::invalid_operation("log record exceeds 4 GiB"))?;
    put_u32(buf, len);
    put_u32(buf, crc32fast::hash(body));
    buf.extend_from_slice(body);
    Ok(())
}

fn write_change(buf: &mut Vec<u8>, name: &str, change: &Change) -> CoreResult<()> {
    let mut body = Vec::new();
    match change {
        Change::Put { key, value } => {
            body.push(RecordType::Put.as_byte());
            put_name(&mut body, name)?;
            put_blob(&mut body, key)?;
            put_blob(&mut body, value)?;
        }
        Change::Remove { key } => {
            body.push(RecordType::Remove.as_byte());
            put_name(&mut body, name)?;
            put_blob(&mut body, key)?;
        }
        Change::Clear => {
            body.push(RecordType::Clear.as_byte());
            put_name(&mut body, name)?;
        }
        Change::Drop => {
            body.push(RecordType::Drop.as_byte());
            put_name(&mut body, name)?;
        }
    }
    frame(buf, &body)
}

fn write_commit(buf: &mut Vec<u8>, count: u32) -> CoreResult<()> {
    let mut body = vec![RecordType::Commit.as_byte()];
    put_u32(&mut body, count);
    frame(buf, &body)
}

fn write_header(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&LOG_MAGIC);
    put_u16(buf, LOG_VERSION);
}

/// Reads one framed record; `None` for a torn, damaged or unknown record.
fn read_record(reader: &mut ByteReader<'_>) -> Option<Record> {
    let len = usize::try_from(reader.u32()?).ok()?;
    let crc = reader.u32()?;
    let body = reader.bytes(len)?;
    if crc32fast::hash(body) != crc {
        return None;
    }

    let mut body = ByteReader::new(body);
    let record = match RecordType::from_byte(body.u8()?)? {
        RecordType::Commit => Record::Commit(body.u32()?),
        kind => {
            let name = body.name()?.to_string();
            let change = match kind {
                RecordType::Put => Change::Put {
                    key: body.blob()?.to_vec(),
                    value: body.blob()?.to_vec(),
                },
                RecordType::Remove => Change::Remove {
                    key: body.blob()?.to_vec(),
                },
                RecordType::Clear => Change::Clear,
                RecordType::Drop | RecordType::Commit => Change::Drop,
            };
            Record::Change(name, change)
        }
    };
    body.is_empty().then_some(record)
}

impl StorageEngine for LogEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Log
    }

    fn open(&self) -> CoreResult<()> {
        let mut slot = self.backend.lock();
        let mut backend = match slot.take() {
            Some(backend) => backend,
            None => self.open_backend()?,
        };

        let data = backend.read_all()?;
        let (tables, records) = if data.is_empty() {
            if !self.read_only {
                let mut header = Vec::new();
                write_header(&mut header);
                backend.append(&header)?;
                backend.sync()?;
            }
            (BTreeMap::new(), 0)
        } else {
            let (tables, committed_end, records) = self.replay(&data)?;
            if committed_end < data.len() {
                warn!(
                    discarded = data.len() - committed_end,
                    "log ends with an incomplete batch"
                );
                if !self.read_only {
                    backend.truncate(committed_end as u64)?;
                }
            }
            (tables, records)
        };

        debug!(maps = tables.len(), records, "log replayed");
        self.journal.lock().clear();
        *self.tables.write() = tables;
        self.records.store(records, Ordering::Release);
        *slot = Some(backend);
        Ok(())
    }

    fn open_map(&self, name: &str) -> CoreResult<Arc<dyn BackendMap>> {
        let mut journal = self.journal.lock();
        let mut tables = self.tables.write();
        if !tables.contains_key(name) {
            tables.insert(
                name.to_string(),
                Arc::new(Table::new(name, self.tracker())),
            );
            // a clear record makes the empty map exist after replay
            if !self.read_only {
                journal.push((name.to_string(), Change::Clear));
            }
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
        let mut journal = self.journal.lock();
        if let Some(table) = self.tables.write().remove(name) {
            table.apply(Change::Drop);
            journal.push((name.to_string(), Change::Drop));
        }
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        if self.read_only {
            return Ok(());
        }
        let mut journal = self.journal.lock();
        if journal.is_empty() {
            return Ok(());
        }
        let mut slot = self.backend.lock();
        let backend = slot.as_mut().ok_or(CoreError::StoreClosed)?;
        self.flush(&mut journal, &mut **backend)
    }

    fn needs_compaction(&self) -> bool {
        let records = self.record_count();
        records > COMPACTION_MIN_RECORDS && self.live_entries() * 2 < records
    }

    fn compact(&self) -> CoreResult<bool> {
        if self.read_only {
            return Ok(false);
        }
        let mut journal = self.journal.lock();
        let mut slot = self.backend.lock();
        let backend = slot.as_mut().ok_or(CoreError::StoreClosed)?;
        self.flush(&mut journal, &mut **backend)?;

        let before = self.record_count();
        let mut image = Vec::new();
        write_header(&mut image);
        let mut count = 0u32;
        for (name, table) in self.tables.read().iter() {
            write_change(&mut image, name, &Change::Clear)?;
            count += 1;
            for (key, value) in table.snapshot() {
                write_change(&mut image, name, &Change::Put { key, value })?;
                count = count
                    .checked_add(1)
                    .ok_or_else(|| CoreError::invalid_operation("too many entries to compact"))?;
            }
        }
        write_commit(&mut image, count)?;

        backend.replace(&image)?;
        self.records.store(u64::from(count) + 1, Ordering::Release);
        info!(
            before,
            after = u64::from(count) + 1,
            bytes = image.len(),
            "log compacted"
        );
        Ok(true)
    }

    fn close(&self) -> CoreResult<()> {
        let backend = self.backend.lock().take();
        drop(backend);
        self.tables.write().clear();
        self.journal.lock().clear();
        Ok(())
    }
}

impl fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEngine")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("records", &self.record_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_storage::InMemoryBackend;

    fn engine_over(backend: &InMemoryBackend) -> LogEngine {
        let engine = LogEngine::with_backend(Box::new(backend.clone()));
        engine.open().unwrap();
        engine
    }

    #[test]
    fn committed_batches_replay() {
        let backend = InMemoryBackend::new();
        let engine = engine_over(&backend);
        let map = engine.open_map("people").unwrap();
        map.put(b"1", b"ann").unwrap();
        map.put(b"2", b"bob").unwrap();
        map.remove(b"1").unwrap();
        engine.open_map("empty").unwrap();
        engine.commit().unwrap();
        engine.close().unwrap();

        let engine = engine_over(&backend);
        assert_eq!(engine.map_names(), ["empty", "people"]);
        let map = engine.open_map("people").unwrap();
        assert_eq!(map.get(b"1").unwrap(), None);
        assert_eq!(map.get(b"2").unwrap(), Some(b"bob".to_vec()));
    }

    #[test]
    fn uncommitted_changes_are_not_replayed() {
        let backend = InMemoryBackend::new();
        let engine = engine_over(&backend);
        let map = engine.open_map("m").unwrap();
        map.put(b"a", b"1").unwrap();
        engine.commit().unwrap();
        map.put(b"b", b"2").unwrap();
        engine.close().unwrap();

        let engine = engine_over(&backend);
        let map = engine.open_map("m").unwrap();
        assert_eq!(map.len().unwrap(), 1);
    }

    #[test]
    fn torn_tail_is_cut_back() {
        let backend = InMemoryBackend::new();
        let engine = engine_over(&backend);
        engine.open_map("m").unwrap().put(b"a", b"1").unwrap();
        engine.commit().unwrap();
        let committed = backend.data().len();
        engine.open_map("m").unwrap().put(b"b", b"2").unwrap();
        engine.commit().unwrap();
        engine.close().unwrap();

        let mut data = backend.data();
        data.truncate(data.len() - 3);
        let backend = InMemoryBackend::with_data(data);

        let engine = engine_over(&backend);
        let map = engine.open_map("m").unwrap();
        assert!(map.contains_key(b"a").unwrap());
        assert!(!map.contains_key(b"b").unwrap());
        assert_eq!(backend.data().len(), committed);
    }

    #[test]
    fn damaged_record_stops_replay() {
        let backend = InMemoryBackend::new();
        let engine = engine_over(&backend);
        engine.open_map("m").unwrap().put(b"a", b"1").unwrap();
        engine.commit().unwrap();
        let committed = backend.data().len();
        engine.open_map("m").unwrap().put(b"b", b"payload").unwrap();
        engine.commit().unwrap();
        engine.close().unwrap();

        let mut data = backend.data();
        let last = data.len() - 12;
        data[last] ^= 0x55;
        let backend = InMemoryBackend::with_data(data);

        let engine = engine_over(&backend);
        assert_eq!(engine.open_map("m").unwrap().len().unwrap(), 1);
        assert_eq!(backend.data().len(), committed);
    }

    #[test]
    fn dropped_map_stays_dropped() {
        let backend = InMemoryBackend::new();
        let engine = engine_over(&backend);
        engine.open_map("gone").unwrap().put(b"k", b"v").unwrap();
        engine.commit().unwrap();
        engine.drop_map("gone").unwrap();
        engine.commit().unwrap();
        engine.close().unwrap();

        let engine = engine_over(&backend);
        assert!(!engine.has_map("gone"));
    }

    #[test]
    fn foreign_content_is_rejected() {
        let backend = InMemoryBackend::with_data(b"definitely not a log".to_vec());
        let engine = LogEngine::with_backend(Box::new(backend));
        assert!(matches!(engine.open(), Err(CoreError::Corruption { .. })));
    }

    #[test]
    fn compaction_keeps_only_live_entries() {
        let backend = InMemoryBackend::new();
        let engine = engine_over(&backend);
        let map = engine.open_map("m").unwrap();
        for round in 0..20u8 {
            map.put(b"hot", &[round]).unwrap();
            engine.commit().unwrap();
        }
        map.put(b"cold", b"x").unwrap();
        engine.commit().unwrap();
        let before = backend.data().len();

        assert!(engine.compact().unwrap());
        assert!(backend.data().len() < before);
        assert_eq!(engine.record_count(), 4);
        engine.close().unwrap();

        let engine = engine_over(&backend);
        let map = engine.open_map("m").unwrap();
        assert_eq!(map.get(b"hot").unwrap(), Some(vec![19]));
        assert_eq!(map.get(b"cold").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn record_types_round_trip_bytes() {
        for kind in [
            RecordType::Put,
            RecordType::Remove,
            RecordType::Clear,
            RecordType::Drop,
            RecordType::Commit,
        ] {
            assert_eq!(RecordType::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(RecordType::from_byte(0), None);
        assert_eq!(RecordType::from_byte(42), None);
    }

    #[test]
    fn file_engine_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.log");

        let engine = LogEngine::new(&path, false);
        engine.open().unwrap();
        engine.open_map("m").unwrap().put(b"k", b"v").unwrap();
        engine.commit().unwrap();
        engine.close().unwrap();

        let reader = LogEngine::new(&path, true);
        reader.open().unwrap();
        assert_eq!(
            reader.open_map("m").unwrap().get(b"k").unwrap(),
            Some(b"v".to_vec())
        );
    }
}
