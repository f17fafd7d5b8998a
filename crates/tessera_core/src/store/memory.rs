//! Volatile engine.

use super::table::{Change, Table, Tracker};
use super::{BackendMap, StorageEngine};
use crate::config::EngineKind;
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Engine keeping every map in process memory.
///
/// Commit has nothing to persist; contents disappear on close.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Memory
    }

    fn open(&self) -> CoreResult<()> {
        Ok(())
    }

    fn open_map(&self, name: &str) -> CoreResult<Arc<dyn BackendMap>> {
        let mut tables = self.tables.write();
        let table = tables
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Table::new(name, Tracker::Volatile)));
        let map: Arc<dyn BackendMap> = Arc::clone(table) as Arc<dyn BackendMap>;
        Ok(map)
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
        }
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        Ok(())
    }

    fn close(&self) -> CoreResult<()> {
        self.tables.write().clear();
        Ok(())
    }
}
