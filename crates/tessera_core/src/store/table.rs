//! Ordered in-process table shared by every engine.

use super::BackendMap;
use crate::error::CoreResult;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A mutation applied to a table, as journaled by the log engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Change {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
    Clear,
    Drop,
}

/// Pending changes of a log engine, in the order they were applied.
pub(crate) type Journal = Arc<Mutex<Vec<(String, Change)>>>;

/// How a table reports its mutations to the owning engine.
#[derive(Debug, Clone)]
pub(crate) enum Tracker {
    /// Nothing to report.
    Volatile,
    /// Raise a flag so the next commit writes a snapshot.
    Dirty(Arc<AtomicBool>),
    /// Append every change to the engine's journal.
    Journal(Journal),
}

/// Ordered binary key/value table.
///
/// For journaled tables the journal lock is held while the table changes, so
/// the journal order always equals the order in which writes became visible.
#[derive(Debug)]
pub(crate) struct Table {
    name: String,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    tracker: Tracker,
}

impl Table {
    pub(crate) fn new(name: &str, tracker: Tracker) -> Self {
        Self::with_entries(name, BTreeMap::new(), tracker)
    }

    pub(crate) fn with_entries(
        name: &str,
        entries: BTreeMap<Vec<u8>, Vec<u8>>,
        tracker: Tracker,
    ) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(entries),
            tracker,
        }
    }

    /// Copies out every entry, in key order.
    pub(crate) fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Applies a replayed change without reporting it.
    pub(crate) fn apply(&self, change: Change) {
        let mut entries = self.entries.write();
        match change {
            Change::Put { key, value } => {
                entries.insert(key, value);
            }
            Change::Remove { key } => {
                entries.remove(&key);
            }
            Change::Clear | Change::Drop => entries.clear(),
        }
    }

    /// Runs `f` against the entries and reports the change it returns.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>) -> (R, Option<Change>),
    ) -> R {
        match &self.tracker {
            Tracker::Volatile => f(&mut self.entries.write()).0,
            Tracker::Dirty(flag) => {
                let (result, change) = f(&mut self.entries.write());
                if change.is_some() {
                    flag.store(true, Ordering::Release);
                }
                result
            }
            Tracker::Journal(journal) => {
                let mut journal = journal.lock();
                let (result, change) = f(&mut self.entries.write());
                if let Some(change) = change {
                    journal.push((self.name.clone(), change));
                }
                result
            }
        }
    }
}

impl BackendMap for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.mutate(|entries| {
            let previous = entries.insert(key.to_vec(), value.to_vec());
            let change = Change::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            };
            (previous, Some(change))
        }))
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> CoreResult<bool> {
        Ok(self.mutate(|entries| {
            if entries.contains_key(key) {
                return (false, None);
            }
            entries.insert(key.to_vec(), value.to_vec());
            let change = Change::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            };
            (true, Some(change))
        }))
    }

    fn replace_if_present(&self, key: &[u8], value: &[u8]) -> CoreResult<bool> {
        Ok(self.mutate(|entries| match entries.get_mut(key) {
            Some(slot) => {
                *slot = value.to_vec();
                let change = Change::Put {
                    key: key.to_vec(),
                    value: value.to_vec(),
                };
                (true, Some(change))
            }
            None => (false, None),
        }))
    }

    fn remove(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.mutate(|entries| {
            let previous = entries.remove(key);
            let change = previous
                .as_ref()
                .map(|_| Change::Remove { key: key.to_vec() });
            (previous, change)
        }))
    }

    fn contains_key(&self, key: &[u8]) -> CoreResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    fn len(&self) -> CoreResult<usize> {
        Ok(self.entries.read().len())
    }

    fn scan(&self, from: Bound<&[u8]>, limit: usize) -> CoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range::<[u8], _>((from, Bound::Unbounded))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear(&self) -> CoreResult<usize> {
        Ok(self.mutate(|entries| {
            let removed = entries.len();
            entries.clear();
            (removed, (removed > 0).then_some(Change::Clear))
        }))
    }
}
