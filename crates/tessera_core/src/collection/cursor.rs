//! Lazy, batch-fetching document cursor.

use crate::document::Document;
use crate::error::CoreResult;
use crate::filter::Filter;
use crate::store::{BackendMap, MapHandle};
use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;

/// Entries fetched from the map per round trip.
const BATCH_SIZE: usize = 64;

/// Iterator over the documents of a collection that match a filter.
///
/// Each call to `find` returns a fresh cursor starting at the lowest
/// identity and resumes each batch after the last key it fetched. Writes
/// beyond the current batch are observed; writes inside it are not. After
/// the first error the cursor ends.
#[derive(Debug)]
pub struct DocumentCursor {
    map: Arc<MapHandle>,
    filter: Filter,
    separator: char,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl DocumentCursor {
    pub(crate) fn new(map: Arc<MapHandle>, filter: Filter, separator: char) -> Self {
        Self {
            map,
            filter,
            separator,
            buffer: VecDeque::new(),
            last_key: None,
            done: false,
        }
    }

    /// Returns the filter this cursor applies.
    #[must_use]
    pub fn query_filter(&self) -> &Filter {
        &self.filter
    }

    /// Advances to the next match, returning its map key as well.
    pub(crate) fn next_entry(&mut self) -> Option<CoreResult<(Vec<u8>, Document)>> {
        loop {
            if let Some((key, bytes)) = self.buffer.pop_front() {
                match Document::from_bytes(&bytes, self.separator) {
                    Ok(doc) if self.filter.matches(&doc) => return Some(Ok((key, doc))),
                    Ok(_) => continue,
                    Err(e) => return Some(Err(self.fail(e))),
                }
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                return Some(Err(self.fail(e)));
            }
        }
    }

    fn fetch(&mut self) -> CoreResult<()> {
        let from = match &self.last_key {
            Some(key) => Bound::Excluded(key.as_slice()),
            None => Bound::Unbounded,
        };
        let batch = self.map.scan(from, BATCH_SIZE)?;
        if batch.len() < BATCH_SIZE {
            self.done = true;
        }
        if let Some((key, _)) = batch.last() {
            self.last_key = Some(key.clone());
        }
        self.buffer.extend(batch);
        Ok(())
    }

    fn fail<E>(&mut self, error: E) -> E {
        self.done = true;
        self.buffer.clear();
        error
    }
}

impl Iterator for DocumentCursor {
    type Item = CoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().map(|entry| entry.map(|(_, doc)| doc))
    }
}
