//! Caller-facing map handle.

use super::{BackendMap, Phase, StoreState};
use crate::error::{CoreError, CoreResult};
use parking_lot::RwLockReadGuard;
use std::borrow::Cow;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_storage::Compressor;

/// A named map of an open store.
///
/// Every operation first checks that the store is still open and that the
/// map has not been dropped. Values pass through the store's compressor, so
/// callers always see the bytes they wrote.
pub struct MapHandle {
    inner: Arc<dyn BackendMap>,
    state: Arc<StoreState>,
    compressor: Option<Arc<dyn Compressor>>,
    dropped: AtomicBool,
}

impl MapHandle {
    pub(crate) fn new(
        inner: Arc<dyn BackendMap>,
        state: Arc<StoreState>,
        compressor: Option<Arc<dyn Compressor>>,
    ) -> Self {
        Self {
            inner,
            state,
            compressor,
            dropped: AtomicBool::new(false),
        }
    }

    /// Returns whether the map has been dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
    }

    /// Returns a guard holding the store open for one operation.
    fn ensure_usable(&self) -> CoreResult<RwLockReadGuard<'_, Phase>> {
        let open = self.state.enter()?;
        if self.is_dropped() {
            return Err(CoreError::CollectionDropped {
                name: self.inner.name().to_string(),
            });
        }
        Ok(open)
    }

    fn ensure_writable(&self) -> CoreResult<RwLockReadGuard<'_, Phase>> {
        let open = self.ensure_usable()?;
        if self.state.is_read_only() {
            return Err(CoreError::illegal_state(format!(
                "cannot write to map {}: store is read-only",
                self.inner.name()
            )));
        }
        Ok(open)
    }

    fn pack<'a>(&self, value: &'a [u8]) -> CoreResult<Cow<'a, [u8]>> {
        match &self.compressor {
            Some(c) => Ok(Cow::Owned(c.compress(value)?)),
            None => Ok(Cow::Borrowed(value)),
        }
    }

    fn unpack(&self, value: Vec<u8>) -> CoreResult<Vec<u8>> {
        match &self.compressor {
            Some(c) => Ok(c.decompress(&value)?),
            None => Ok(value),
        }
    }

    fn unpack_opt(&self, value: Option<Vec<u8>>) -> CoreResult<Option<Vec<u8>>> {
        value.map(|v| self.unpack(v)).transpose()
    }
}

impl BackendMap for MapHandle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        let _open = self.ensure_usable()?;
        let value = self.inner.get(key)?;
        self.unpack_opt(value)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        let _open = self.ensure_writable()?;
        let packed = self.pack(value)?;
        let previous = self.inner.put(key, &packed)?;
        self.unpack_opt(previous)
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> CoreResult<bool> {
        let _open = self.ensure_writable()?;
        let packed = self.pack(value)?;
        self.inner.put_if_absent(key, &packed)
    }

    fn replace_if_present(&self, key: &[u8], value: &[u8]) -> CoreResult<bool> {
        let _open = self.ensure_writable()?;
        let packed = self.pack(value)?;
        self.inner.replace_if_present(key, &packed)
    }

    fn remove(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        let _open = self.ensure_writable()?;
        let previous = self.inner.remove(key)?;
        self.unpack_opt(previous)
    }

    fn contains_key(&self, key: &[u8]) -> CoreResult<bool> {
        let _open = self.ensure_usable()?;
        self.inner.contains_key(key)
    }

    fn len(&self) -> CoreResult<usize> {
        let _open = self.ensure_usable()?;
        self.inner.len()
    }

    fn scan(&self, from: Bound<&[u8]>, limit: usize) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let _open = self.ensure_usable()?;
        self.inner
            .scan(from, limit)?
            .into_iter()
            .map(|(k, v)| Ok((k, self.unpack(v)?)))
            .collect()
    }

    fn clear(&self) -> CoreResult<usize> {
        let _open = self.ensure_writable()?;
        self.inner.clear()
    }
}

impl fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapHandle")
            .field("name", &self.inner.name())
            .field("compressed", &self.compressor.is_some())
            .field("dropped", &self.is_dropped())
            .finish()
    }
}
