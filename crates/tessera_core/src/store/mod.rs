//! Storage engines and the store lifecycle.
//!
//! A [`Store`] wraps one [`StorageEngine`] and owns everything around it:
//! the location lock, the store metadata, the credential gate, value
//! compression and the background commit task. Callers reach stored bytes
//! through [`MapHandle`]s, which implement the ordered [`BackendMap`]
//! contract.
//!
//! Engines:
//!
//! - [`MemoryEngine`] - volatile, commit does nothing
//! - [`BTreeEngine`] - ordered tables saved as one checksummed snapshot
//! - [`LogEngine`] - append-only change log replayed on open

mod autocommit;
mod btree;
mod credential;
mod frame;
mod handle;
mod info;
mod log;
mod memory;
mod module;
mod table;

pub use btree::BTreeEngine;
pub use credential::{Credential, CredentialVerifier};
pub use handle::MapHandle;
pub use info::{StoreInfo, FORMAT_VERSION};
pub use log::{LogEngine, RecordType, LOG_MAGIC, LOG_VERSION};
pub use memory::MemoryEngine;
pub use module::StoreModule;

pub(crate) use info::RESERVED_PREFIX;

use crate::config::{EngineKind, StoreConfig};
use crate::error::{CoreError, CoreResult};
use autocommit::AutoCommit;
use info::{KEY_FIELDS_MAP, STORE_INFO_KEY, STORE_INFO_MAP};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tessera_storage::{Compressor, LockMode, StorageError, StoreLock};
use tracing::{debug, info, warn};

/// An ordered binary key/value map.
///
/// Keys iterate in byte order. Every single call is atomic with respect to
/// other calls on the same map.
pub trait BackendMap: Send + Sync {
    /// Returns the map name.
    fn name(&self) -> &str;

    /// Returns the value stored under `key`.
    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>>;

    /// Stores `value` under `key` and returns the previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<Option<Vec<u8>>>;

    /// Stores `value` only if `key` is absent; returns whether it did.
    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> CoreResult<bool>;

    /// Stores `value` only if `key` is present; returns whether it did.
    fn replace_if_present(&self, key: &[u8], value: &[u8]) -> CoreResult<bool>;

    /// Removes `key` and returns its value.
    fn remove(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>>;

    /// Returns whether `key` is present.
    fn contains_key(&self, key: &[u8]) -> CoreResult<bool>;

    /// Returns the number of entries.
    fn len(&self) -> CoreResult<usize>;

    /// Returns whether the map has no entries.
    fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns up to `limit` entries in key order, starting at `from`.
    ///
    /// Passing `Bound::Excluded(last_key)` resumes a previous scan.
    fn scan(&self, from: Bound<&[u8]>, limit: usize) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Returns every entry in key order.
    fn entries(&self) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.scan(Bound::Unbounded, usize::MAX)
    }

    /// Removes every entry and returns how many there were.
    fn clear(&self) -> CoreResult<usize>;
}

/// A key/value engine owning named maps and a commit boundary.
///
/// Writes become visible immediately but durable only after
/// [`commit`](Self::commit). Lifecycle checks live in [`Store`]; engines
/// assume they are called between `open` and `close`.
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Returns the engine variant.
    fn kind(&self) -> EngineKind;

    /// Loads persisted state.
    fn open(&self) -> CoreResult<()>;

    /// Returns the map called `name`, creating it on first access.
    fn open_map(&self, name: &str) -> CoreResult<Arc<dyn BackendMap>>;

    /// Returns whether a map called `name` exists.
    fn has_map(&self, name: &str) -> bool;

    /// Returns the names of every map, in order.
    fn map_names(&self) -> Vec<String>;

    /// Deletes a map and its contents.
    fn drop_map(&self, name: &str) -> CoreResult<()>;

    /// Makes every write so far durable as one unit.
    fn commit(&self) -> CoreResult<()>;

    /// Releases engine resources. Uncommitted writes are discarded.
    fn close(&self) -> CoreResult<()>;

    /// Rewrites persisted state to drop obsolete data; returns whether it did.
    fn compact(&self) -> CoreResult<bool> {
        Ok(false)
    }

    /// Returns whether [`compact`](Self::compact) would reclaim most of the
    /// persisted data.
    fn needs_compaction(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Built,
    Open,
    Closed,
}

/// Lifecycle state shared between a store and its map handles.
#[derive(Debug)]
pub(crate) struct StoreState {
    phase: RwLock<Phase>,
    read_only: bool,
}

impl StoreState {
    fn new(read_only: bool) -> Self {
        Self {
            phase: RwLock::new(Phase::Built),
            read_only,
        }
    }

    /// Checks that the store is open and keeps it open while the guard
    /// lives; `close` waits for every outstanding guard.
    ///
    /// Guards must not nest on one thread: a waiting `close` would block
    /// the inner one.
    pub(crate) fn enter(&self) -> CoreResult<RwLockReadGuard<'_, Phase>> {
        let phase = self.phase.read();
        match *phase {
            Phase::Open => Ok(phase),
            Phase::Built | Phase::Closed => Err(CoreError::StoreClosed),
        }
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// An engine plus its lifecycle.
///
/// Built by [`StoreModule::build`], usable after [`open`](Self::open) and
/// terminal after [`close`](Self::close). Dropping an open store closes it.
pub struct Store {
    config: StoreConfig,
    kind: EngineKind,
    engine: Arc<dyn StorageEngine>,
    state: Arc<StoreState>,
    compressor: Arc<dyn Compressor>,
    active_compressor: RwLock<Option<Arc<dyn Compressor>>>,
    maps: RwLock<HashMap<String, Arc<MapHandle>>>,
    lock: Mutex<Option<StoreLock>>,
    autocommit: Mutex<Option<AutoCommit>>,
    info: RwLock<Option<StoreInfo>>,
}

impl Store {
    pub(crate) fn new(
        config: StoreConfig,
        kind: EngineKind,
        engine: Arc<dyn StorageEngine>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        let state = Arc::new(StoreState::new(config.read_only));
        Self {
            config,
            kind,
            engine,
            state,
            compressor,
            active_compressor: RwLock::new(None),
            maps: RwLock::new(HashMap::new()),
            lock: Mutex::new(None),
            autocommit: Mutex::new(None),
            info: RwLock::new(None),
        }
    }

    /// Opens the store.
    ///
    /// Locks the location, loads the engine and checks the store metadata.
    /// A new store records its format version, compression setting and, when
    /// `credential` is given, a verifier for it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::StoreLocked`] if another handle writes to the location
    /// - [`CoreError::Authentication`] if a protected store gets a missing or
    ///   wrong credential, or an unprotected store gets one
    /// - [`CoreError::VersionMismatch`] for an incompatible format
    /// - [`CoreError::IllegalState`] if the store was opened before
    pub fn open(&self, credential: Option<&Credential>) -> CoreResult<()> {
        let mut phase = self.state.phase.write();
        match *phase {
            Phase::Built => {}
            Phase::Open => return Err(CoreError::illegal_state("store is already open")),
            Phase::Closed => return Err(CoreError::StoreClosed),
        }

        let lock = self.acquire_lock()?;
        self.engine.open()?;

        let started = self.load_info(credential).and_then(|info| {
            let task = if self.config.auto_commit
                && !self.config.read_only
                && self.kind.is_persistent()
            {
                let interval = self.config.auto_commit_interval();
                Some(AutoCommit::start(Arc::clone(&self.engine), interval)?)
            } else {
                None
            };
            Ok((info, task))
        });
        let (info, task) = match started {
            Ok(opened) => opened,
            Err(e) => {
                if let Err(close) = self.engine.close() {
                    warn!(error = %close, "failed to close engine after a failed open");
                }
                return Err(e);
            }
        };

        *self.active_compressor.write() = info
            .is_compressed()
            .then(|| Arc::clone(&self.compressor));
        info!(
            engine = %self.kind,
            path = ?self.config.file_path,
            read_only = self.config.read_only,
            compressed = info.is_compressed(),
            protected = info.is_protected(),
            "store opened"
        );
        *self.info.write() = Some(info);
        *self.autocommit.lock() = task;
        *self.lock.lock() = lock;
        *phase = Phase::Open;
        Ok(())
    }

    fn acquire_lock(&self) -> CoreResult<Option<StoreLock>> {
        let Some(path) = self.config.file_path.as_deref() else {
            return Ok(None);
        };

        if self.config.read_only {
            if !path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no store at {}", path.display()),
                )
                .into());
            }
        } else if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mode = if self.config.read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        match StoreLock::acquire(path, mode) {
            Ok(lock) => Ok(Some(lock)),
            Err(StorageError::Locked { .. }) => Err(CoreError::StoreLocked {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn load_info(&self, credential: Option<&Credential>) -> CoreResult<StoreInfo> {
        let existing = if self.engine.has_map(STORE_INFO_MAP) {
            self.engine.open_map(STORE_INFO_MAP)?.get(STORE_INFO_KEY)?
        } else {
            None
        };

        let Some(bytes) = existing else {
            return self.create_info(credential);
        };

        let info = StoreInfo::decode(&bytes)?;
        info.check_version()?;
        if info.engine != self.kind {
            return Err(CoreError::configuration(format!(
                "store was created by the {} engine, not {}",
                info.engine, self.kind
            )));
        }
        Self::authenticate(&info, credential)?;

        if let Some(name) = &info.compressor {
            if name != self.compressor.name() {
                return Err(CoreError::configuration(format!(
                    "store values are compressed with {name}, but {} is configured",
                    self.compressor.name()
                )));
            }
        }
        if info.is_compressed() != self.config.compress {
            info!(
                stored = info.is_compressed(),
                configured = self.config.compress,
                "compression follows the setting recorded in the store"
            );
        }
        Ok(info)
    }

    fn create_info(&self, credential: Option<&Credential>) -> CoreResult<StoreInfo> {
        if self.config.read_only {
            return Err(CoreError::corruption("store metadata is missing"));
        }
        let verifier = credential.map(CredentialVerifier::create).transpose()?;
        let compressor = self.config.compress.then(|| self.compressor.name());
        let info = StoreInfo::new(self.kind, compressor, verifier);

        self.engine
            .open_map(STORE_INFO_MAP)?
            .put(STORE_INFO_KEY, &info.encode()?)?;
        self.engine.commit()?;
        debug!(engine = %self.kind, "store metadata created");
        Ok(info)
    }

    fn authenticate(info: &StoreInfo, credential: Option<&Credential>) -> CoreResult<()> {
        match (info.verifier(), credential) {
            (Some(verifier), Some(credential)) => {
                if verifier.verify(credential)? {
                    Ok(())
                } else {
                    Err(CoreError::authentication("invalid credential"))
                }
            }
            (Some(_), None) => Err(CoreError::authentication(
                "store is protected, a credential is required",
            )),
            (None, Some(_)) => Err(CoreError::authentication(
                "store is not protected, a credential was not expected",
            )),
            (None, None) => Ok(()),
        }
    }

    /// Returns the map called `name`, creating it on first access.
    ///
    /// The same handle is returned for the same name until the map is
    /// dropped or the store closed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an empty name or one
    /// starting with `$`, which is reserved for store metadata.
    pub fn map(&self, name: &str) -> CoreResult<Arc<MapHandle>> {
        let _open = self.state.enter()?;
        validate_map_name(name)?;

        if let Some(handle) = self.maps.read().get(name) {
            return Ok(Arc::clone(handle));
        }

        let mut maps = self.maps.write();
        if let Some(handle) = maps.get(name) {
            return Ok(Arc::clone(handle));
        }
        let inner = self.engine.open_map(name)?;
        let compressor = self.active_compressor.read().clone();
        let handle = Arc::new(MapHandle::new(inner, Arc::clone(&self.state), compressor));
        maps.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Returns whether a map called `name` exists.
    pub fn has_map(&self, name: &str) -> CoreResult<bool> {
        let _open = self.state.enter()?;
        Ok(!is_reserved(name) && self.engine.has_map(name))
    }

    /// Returns the names of every caller-visible map, in order.
    pub fn map_names(&self) -> CoreResult<Vec<String>> {
        let _open = self.state.enter()?;
        Ok(self
            .engine
            .map_names()
            .into_iter()
            .filter(|name| !is_reserved(name))
            .collect())
    }

    /// Deletes a map and its contents.
    ///
    /// Handles to the map fail with [`CoreError::CollectionDropped`] from now
    /// on. Dropping a map that does not exist does nothing.
    pub fn drop_map(&self, name: &str) -> CoreResult<()> {
        let _open = self.state.enter()?;
        validate_map_name(name)?;
        if self.config.read_only {
            return Err(CoreError::illegal_state(format!(
                "cannot drop map {name}: store is read-only"
            )));
        }

        if let Some(handle) = self.maps.write().remove(name) {
            handle.mark_dropped();
        }
        self.engine.drop_map(name)?;
        if self.engine.has_map(KEY_FIELDS_MAP) {
            self.engine
                .open_map(KEY_FIELDS_MAP)?
                .remove(name.as_bytes())?;
        }
        debug!(map = name, "map dropped");
        Ok(())
    }

    /// Returns the key field recorded for map `name`.
    pub(crate) fn key_field(&self, name: &str) -> CoreResult<Option<String>> {
        let _open = self.state.enter()?;
        validate_map_name(name)?;
        self.recorded_key_field(name)
    }

    fn recorded_key_field(&self, name: &str) -> CoreResult<Option<String>> {
        if !self.engine.has_map(KEY_FIELDS_MAP) {
            return Ok(None);
        }
        self.engine
            .open_map(KEY_FIELDS_MAP)?
            .get(name.as_bytes())?
            .map(|field| {
                String::from_utf8(field)
                    .map_err(|_| CoreError::corruption(format!("key field of map {name} is not text")))
            })
            .transpose()
    }

    /// Records `field` as the key field of map `name` on first use and
    /// checks it on every later use.
    ///
    /// A read-only store checks without recording.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the map is keyed by a
    /// different field.
    pub(crate) fn bind_key_field(&self, name: &str, field: &str) -> CoreResult<()> {
        let _open = self.state.enter()?;
        validate_map_name(name)?;
        if !self.config.read_only
            && self
                .engine
                .open_map(KEY_FIELDS_MAP)?
                .put_if_absent(name.as_bytes(), field.as_bytes())?
        {
            return Ok(());
        }
        match self.recorded_key_field(name)? {
            Some(recorded) if recorded != field => Err(CoreError::invalid_operation(format!(
                "map {name} is keyed by {recorded}, not {field}"
            ))),
            _ => Ok(()),
        }
    }

    /// Makes every write so far durable as one unit.
    ///
    /// Does nothing for a read-only store.
    pub fn commit(&self) -> CoreResult<()> {
        let _open = self.state.enter()?;
        if self.config.read_only {
            return Ok(());
        }
        self.engine.commit()
    }

    /// Commits, then rewrites persisted state without obsolete data.
    ///
    /// Returns whether the engine compacted anything.
    pub fn compact(&self) -> CoreResult<bool> {
        let _open = self.state.enter()?;
        if self.config.read_only {
            return Ok(false);
        }
        self.engine.commit()?;
        self.engine.compact()
    }

    /// Closes the store.
    ///
    /// Stops background commits, commits unless read-only, closes the engine
    /// and releases the location lock. Every step runs even if an earlier one
    /// fails; the first error is returned. Closing twice does nothing.
    pub fn close(&self) -> CoreResult<()> {
        let mut phase = self.state.phase.write();
        if *phase != Phase::Open {
            *phase = Phase::Closed;
            return Ok(());
        }
        *phase = Phase::Closed;

        let mut result = Ok(());
        if let Some(task) = self.autocommit.lock().take() {
            result = task.stop();
        }
        if !self.config.read_only {
            result = result.and(self.engine.commit());
            if result.is_ok() && self.engine.needs_compaction() {
                result = self.engine.compact().map(|_| ());
            }
        }
        result = result.and(self.engine.close());

        self.maps.write().clear();
        self.lock.lock().take();
        info!(engine = %self.kind, path = ?self.config.file_path, "store closed");
        result
    }

    /// Returns whether the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.state.phase.read() == Phase::Open
    }

    /// Returns whether the store has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.state.phase.read() == Phase::Closed
    }

    /// Returns whether the store rejects writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Returns the engine variant.
    #[must_use]
    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Returns the configuration the store was built from.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the store location, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.config.file_path.as_deref()
    }

    /// Returns the metadata loaded on open.
    #[must_use]
    pub fn store_info(&self) -> Option<StoreInfo> {
        self.info.read().clone()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("kind", &self.kind)
            .field("path", &self.config.file_path)
            .field("phase", &*self.state.phase.read())
            .finish_non_exhaustive()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close store on drop");
        }
    }
}

fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

fn validate_map_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_operation("map name is empty"));
    }
    if is_reserved(name) {
        return Err(CoreError::invalid_operation(format!(
            "map name {name} is reserved"
        )));
    }
    Ok(())
}
