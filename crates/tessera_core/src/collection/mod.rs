//! Document collections.
//!
//! A [`Collection`] interprets one store map as identity key → encoded
//! [`Document`]. Every stored document carries its identity field, and the
//! key is that field's value encoded so that scans run in identity order.

mod cursor;
mod key;

pub use cursor::DocumentCursor;

pub(crate) use key::{display_key, encode_key};

use crate::document::{Document, DocumentId, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::store::{BackendMap, MapHandle, Store};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_codec::Value;
use tracing::debug;

/// Convention identity field of record types that declare none.
pub const CONVENTION_ID_FIELD: &str = "id";

/// Where a collection's identity field comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Named by the record type.
    Declared,
    /// The record type has a field called `id`.
    Convention,
    /// `_id`, filled by the collection on insert.
    Synthetic,
}

/// The field that identifies documents in a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    field: String,
    source: IdentitySource,
}

impl Identity {
    /// Identity declared by a record type.
    #[must_use]
    pub fn declared(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            source: IdentitySource::Declared,
        }
    }

    /// The convention `id` field.
    #[must_use]
    pub fn convention() -> Self {
        Self {
            field: CONVENTION_ID_FIELD.to_string(),
            source: IdentitySource::Convention,
        }
    }

    /// The synthesized `_id` field.
    #[must_use]
    pub fn synthetic() -> Self {
        Self {
            field: ID_FIELD.to_string(),
            source: IdentitySource::Synthetic,
        }
    }

    /// The identity a collection was recorded with, known only by field.
    pub(crate) fn recorded(field: String) -> Self {
        match field.as_str() {
            ID_FIELD => Self::synthetic(),
            CONVENTION_ID_FIELD => Self::convention(),
            _ => Self::declared(field),
        }
    }

    /// Returns the identity field name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns where the identity comes from.
    #[must_use]
    pub fn source(&self) -> IdentitySource {
        self.source
    }

    /// Returns whether the collection generates identities.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.source == IdentitySource::Synthetic
    }
}

/// Options for [`Collection::update_with`] and [`Collection::update_where`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert when nothing matches.
    pub upsert: bool,
    /// Update at most one document.
    pub just_once: bool,
}

impl UpdateOptions {
    /// Insert when nothing matches.
    #[must_use]
    pub const fn upsert() -> Self {
        Self {
            upsert: true,
            just_once: false,
        }
    }

    /// Update at most one document.
    #[must_use]
    pub const fn just_once() -> Self {
        Self {
            upsert: false,
            just_once: true,
        }
    }
}

/// Identities touched by a write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    affected: Vec<Value>,
}

impl WriteResult {
    fn of(affected: Vec<Value>) -> Self {
        Self { affected }
    }

    /// Returns the affected identities in write order.
    #[must_use]
    pub fn affected(&self) -> &[Value] {
        &self.affected
    }

    /// Returns how many documents were written.
    #[must_use]
    pub fn count(&self) -> usize {
        self.affected.len()
    }
}

impl IntoIterator for WriteResult {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.affected.into_iter()
    }
}

/// A named set of documents.
///
/// Obtained from [`Database::collection`](crate::Database::collection).
/// Clones are cheap and share state; after [`drop`](Self::drop) every
/// operation on any handle of the collection fails with
/// [`CoreError::CollectionDropped`].
#[derive(Clone)]
pub struct Collection {
    name: String,
    map: Arc<MapHandle>,
    store: Arc<Store>,
    identity: Identity,
    separator: char,
    dropped: Arc<AtomicBool>,
}

impl Collection {
    pub(crate) fn new(
        name: &str,
        map: Arc<MapHandle>,
        store: Arc<Store>,
        identity: Identity,
        separator: char,
    ) -> Self {
        Self {
            name: name.to_string(),
            map,
            store,
            identity,
            separator,
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identity field of this collection.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns whether the collection has been dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire) || self.map.is_dropped()
    }

    fn ensure_usable(&self) -> CoreResult<()> {
        if self.is_dropped() {
            return Err(CoreError::CollectionDropped {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Reads the identity of `document`, generating one when the
    /// collection owns its identities.
    fn assign_identity(&self, document: &mut Document) -> CoreResult<Value> {
        if let Ok(id) = self.existing_identity(document) {
            return Ok(id.clone());
        }
        if !self.identity.is_synthetic() {
            return Err(self.missing_identity());
        }
        let id = Value::from(DocumentId::new());
        document.put_field(self.identity.field(), id.clone());
        Ok(id)
    }

    fn existing_identity<'d>(&self, document: &'d Document) -> CoreResult<&'d Value> {
        match document.get_field(self.identity.field()) {
            Some(id) if !id.is_null() => Ok(id),
            _ => Err(self.missing_identity()),
        }
    }

    fn missing_identity(&self) -> CoreError {
        CoreError::MissingIdentity {
            owner: self.name.clone(),
            field: self.identity.field().to_string(),
        }
    }

    fn duplicate(&self, id: &Value) -> CoreError {
        CoreError::DuplicateKey {
            collection: self.name.clone(),
            key: display_key(id),
        }
    }

    fn not_found(&self, id: &Value) -> CoreError {
        CoreError::NotFound {
            collection: self.name.clone(),
            key: display_key(id),
        }
    }

    /// Stores a copy of `document` and returns its identity.
    ///
    /// A synthetic identity is generated when the document has none.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateKey`] if the identity is already stored
    /// - [`CoreError::MissingIdentity`] if a declared identity is absent
    pub fn insert(&self, document: &Document) -> CoreResult<Value> {
        self.ensure_usable()?;
        let mut document = document.clone();
        let id = self.assign_identity(&mut document)?;
        let key = encode_key(&id)?;
        if !self.map.put_if_absent(&key, &document.to_bytes()?)? {
            return Err(self.duplicate(&id));
        }
        Ok(id)
    }

    /// Stores every document, or none if one of them cannot be stored.
    ///
    /// Identities are checked against each other and against the collection
    /// before the first write.
    pub fn insert_many(&self, documents: &[Document]) -> CoreResult<WriteResult> {
        self.ensure_usable()?;
        let mut prepared = Vec::with_capacity(documents.len());
        let mut seen = HashSet::with_capacity(documents.len());
        for document in documents {
            let mut document = document.clone();
            let id = self.assign_identity(&mut document)?;
            let key = encode_key(&id)?;
            if !seen.insert(key.clone()) || self.map.contains_key(&key)? {
                return Err(self.duplicate(&id));
            }
            prepared.push((id, key, document.to_bytes()?));
        }

        let mut affected = Vec::with_capacity(prepared.len());
        for (id, key, bytes) in prepared {
            if !self.map.put_if_absent(&key, &bytes)? {
                return Err(self.duplicate(&id));
            }
            affected.push(id);
        }
        Ok(WriteResult::of(affected))
    }

    /// Replaces the stored document with the same identity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no document has that identity.
    pub fn update(&self, document: &Document) -> CoreResult<WriteResult> {
        self.update_with(document, UpdateOptions::default())
    }

    /// Replaces the stored document with the same identity, inserting it
    /// instead when `options.upsert` is set.
    pub fn update_with(
        &self,
        document: &Document,
        options: UpdateOptions,
    ) -> CoreResult<WriteResult> {
        self.ensure_usable()?;
        if options.upsert && self.identity.is_synthetic() {
            let absent = document
                .get_field(self.identity.field())
                .map_or(true, Value::is_null);
            if absent {
                return Ok(WriteResult::of(vec![self.insert(document)?]));
            }
        }

        let id = self.existing_identity(document)?.clone();
        let key = encode_key(&id)?;
        let bytes = document.to_bytes()?;
        if options.upsert {
            self.map.put(&key, &bytes)?;
        } else if !self.map.replace_if_present(&key, &bytes)? {
            return Err(self.not_found(&id));
        }
        Ok(WriteResult::of(vec![id]))
    }

    /// Merges `patch` into every document matching `filter`.
    ///
    /// The patch may repeat a document's identity but never change it; this
    /// is checked for every match before anything is written. A null
    /// identity in the patch is ignored. With
    /// `options.upsert` and no match, the patch is inserted as a new
    /// document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the patch would change an
    /// identity.
    pub fn update_where(
        &self,
        filter: &Filter,
        patch: &Document,
        options: UpdateOptions,
    ) -> CoreResult<WriteResult> {
        self.ensure_usable()?;
        let mut patch = patch.clone();
        if patch
            .get_field(self.identity.field())
            .is_some_and(Value::is_null)
        {
            patch.remove_field(self.identity.field());
        }
        let patch_id = patch.get_field(self.identity.field());

        let mut updates = Vec::new();
        let mut cursor = self.find(filter.clone())?;
        while let Some(entry) = cursor.next_entry() {
            let (key, mut document) = entry?;
            let id = self.existing_identity(&document)?.clone();
            if patch_id.is_some_and(|new_id| new_id != &id) {
                return Err(CoreError::invalid_operation(format!(
                    "update would change identity {} of a document in {}",
                    display_key(&id),
                    self.name
                )));
            }
            document.merge(&patch);
            updates.push((id, key, document.to_bytes()?));
            if options.just_once {
                break;
            }
        }

        if updates.is_empty() {
            if options.upsert {
                return Ok(WriteResult::of(vec![self.insert(&patch)?]));
            }
            return Ok(WriteResult::default());
        }

        let mut affected = Vec::with_capacity(updates.len());
        for (id, key, bytes) in updates {
            // skip documents removed since they matched
            if self.map.replace_if_present(&key, &bytes)? {
                affected.push(id);
            }
        }
        Ok(WriteResult::of(affected))
    }

    /// Removes every document matching `filter` and returns how many.
    ///
    /// [`Filter::All`] empties the collection without dropping it.
    pub fn remove(&self, filter: &Filter) -> CoreResult<usize> {
        self.ensure_usable()?;
        if filter.is_all() {
            return self.map.clear();
        }

        let mut keys = Vec::new();
        let mut cursor = self.find(filter.clone())?;
        while let Some(entry) = cursor.next_entry() {
            keys.push(entry?.0);
        }

        let mut removed = 0;
        for key in keys {
            if self.map.remove(&key)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes the document with identity `id`; returns whether it existed.
    pub fn remove_by_id(&self, id: &Value) -> CoreResult<bool> {
        self.ensure_usable()?;
        Ok(self.map.remove(&encode_key(id)?)?.is_some())
    }

    /// Returns the document with identity `id`.
    pub fn get_by_id(&self, id: &Value) -> CoreResult<Option<Document>> {
        self.ensure_usable()?;
        self.map
            .get(&encode_key(id)?)?
            .map(|bytes| Document::from_bytes(&bytes, self.separator))
            .transpose()
    }

    /// Returns a lazy cursor over the documents matching `filter`, in
    /// identity order.
    ///
    /// Documents are fetched from the map in batches as the cursor advances,
    /// so writes made while iterating may or may not be observed.
    pub fn find(&self, filter: Filter) -> CoreResult<DocumentCursor> {
        self.ensure_usable()?;
        Ok(DocumentCursor::new(
            Arc::clone(&self.map),
            filter,
            self.separator,
        ))
    }

    /// Returns a cursor over every document.
    pub fn scan(&self) -> CoreResult<DocumentCursor> {
        self.find(Filter::All)
    }

    /// Returns the number of documents.
    pub fn size(&self) -> CoreResult<usize> {
        self.ensure_usable()?;
        self.map.len()
    }

    /// Removes every document and returns how many there were.
    pub fn clear(&self) -> CoreResult<usize> {
        self.ensure_usable()?;
        self.map.clear()
    }

    /// Deletes the collection and its contents.
    ///
    /// Every later operation on this collection fails.
    pub fn drop(&self) -> CoreResult<()> {
        self.ensure_usable()?;
        self.store.drop_map(&self.name)?;
        self.dropped.store(true, Ordering::Release);
        debug!(collection = %self.name, "collection dropped");
        Ok(())
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("dropped", &self.is_dropped())
            .finish_non_exhaustive()
    }
}
