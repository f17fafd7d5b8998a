//! Typed access to a collection.
//!
//! An [`ObjectRepository`] stores records of one [`Mappable`] type in a
//! [`Collection`], converting through a [`Mapper`] in both directions.

use crate::collection::{Collection, DocumentCursor, Identity, UpdateOptions, WriteResult};
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::mapper::{Mappable, Mapper};
use std::fmt;
use std::marker::PhantomData;
use tessera_codec::Value;

/// Records of type `T` kept in a collection.
///
/// Obtained from [`Database::repository`](crate::Database::repository).
pub struct ObjectRepository<T: Mappable> {
    collection: Collection,
    mapper: Mapper,
    _record: PhantomData<fn() -> T>,
}

impl<T: Mappable> ObjectRepository<T> {
    pub(crate) fn new(collection: Collection, mapper: Mapper) -> Self {
        Self {
            collection,
            mapper,
            _record: PhantomData,
        }
    }

    /// Returns the underlying collection.
    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Returns the identity field of `T`.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.collection.identity()
    }

    /// Converts `record`, checking that a declared or convention identity
    /// is filled in.
    fn to_document(&self, record: &T) -> CoreResult<Document> {
        let document = self.mapper.write(record)?;
        let identity = self.identity();
        if !identity.is_synthetic() {
            let present = document
                .get_field(identity.field())
                .is_some_and(|id| !id.is_null());
            if !present {
                return Err(CoreError::MissingIdentity {
                    owner: T::collection_name().to_string(),
                    field: identity.field().to_string(),
                });
            }
        }
        Ok(document)
    }

    /// Stores `record` and returns its identity.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingIdentity`] if the identity field is absent or null
    /// - [`CoreError::DuplicateKey`] if a record with that identity exists
    pub fn insert(&self, record: &T) -> CoreResult<Value> {
        let document = self.to_document(record)?;
        self.collection.insert(&document)
    }

    /// Stores every record, or none when one of them is rejected.
    pub fn insert_many(&self, records: &[T]) -> CoreResult<WriteResult> {
        let documents = records
            .iter()
            .map(|record| self.to_document(record))
            .collect::<CoreResult<Vec<_>>>()?;
        self.collection.insert_many(&documents)
    }

    /// Replaces the stored record with the same identity.
    ///
    /// Types without an identity field of their own cannot be addressed this
    /// way; use [`update_where`](Self::update_where).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if nothing has that identity.
    pub fn update(&self, record: &T) -> CoreResult<WriteResult> {
        self.replace(record, UpdateOptions::default())
    }

    /// Replaces the stored record with the same identity, inserting it when
    /// there is none.
    pub fn upsert(&self, record: &T) -> CoreResult<WriteResult> {
        self.replace(record, UpdateOptions::upsert())
    }

    fn replace(&self, record: &T, options: UpdateOptions) -> CoreResult<WriteResult> {
        if self.identity().is_synthetic() {
            return Err(CoreError::invalid_operation(format!(
                "{} has no identity field; use update_where",
                T::collection_name()
            )));
        }
        let document = self.to_document(record)?;
        self.collection.update_with(&document, options)
    }

    /// Overwrites every record matching `filter` with the fields of `record`.
    ///
    /// The identity of a matched record is kept; a record whose identity
    /// differs from a match is rejected before anything is written. With
    /// `options.upsert` and no match, `record` is inserted.
    pub fn update_where(
        &self,
        filter: &Filter,
        record: &T,
        options: UpdateOptions,
    ) -> CoreResult<WriteResult> {
        let patch = self.mapper.write(record)?;
        self.collection.update_where(filter, &patch, options)
    }

    /// Removes every record matching `filter` and returns how many.
    pub fn remove(&self, filter: &Filter) -> CoreResult<usize> {
        self.collection.remove(filter)
    }

    /// Removes the record with identity `id`; returns whether it existed.
    pub fn remove_by_id(&self, id: impl Into<Value>) -> CoreResult<bool> {
        self.collection.remove_by_id(&id.into())
    }

    /// Returns the record with identity `id`.
    pub fn get_by_id(&self, id: impl Into<Value>) -> CoreResult<Option<T>> {
        self.collection
            .get_by_id(&id.into())?
            .map(|document| self.mapper.read(&document))
            .transpose()
    }

    /// Returns a lazy cursor over the records matching `filter`.
    pub fn find(&self, filter: Filter) -> CoreResult<ObjectCursor<T>> {
        Ok(ObjectCursor {
            inner: self.collection.find(filter)?,
            mapper: self.mapper,
            _record: PhantomData,
        })
    }

    /// Returns a cursor over every record.
    pub fn scan(&self) -> CoreResult<ObjectCursor<T>> {
        self.find(Filter::All)
    }

    /// Returns the number of records.
    pub fn size(&self) -> CoreResult<usize> {
        self.collection.size()
    }

    /// Removes every record and returns how many there were.
    pub fn clear(&self) -> CoreResult<usize> {
        self.collection.clear()
    }

    /// Deletes the repository's collection.
    pub fn drop(&self) -> CoreResult<()> {
        self.collection.drop()
    }

    /// Returns whether the collection has been dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.collection.is_dropped()
    }
}

impl<T: Mappable> fmt::Debug for ObjectRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRepository")
            .field("type", &T::collection_name())
            .field("collection", &self.collection)
            .finish()
    }
}

/// Lazy iterator over records, created by [`ObjectRepository::find`].
///
/// A stored document that cannot be read back as `T` yields a
/// [`CoreError::Mapping`] item.
pub struct ObjectCursor<T: Mappable> {
    inner: DocumentCursor,
    mapper: Mapper,
    _record: PhantomData<fn() -> T>,
}

impl<T: Mappable> ObjectCursor<T> {
    /// Returns the filter this cursor evaluates.
    #[must_use]
    pub fn query_filter(&self) -> &Filter {
        self.inner.query_filter()
    }
}

impl<T: Mappable> Iterator for ObjectCursor<T> {
    type Item = CoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = match self.inner.next()? {
            Ok(document) => document,
            Err(e) => return Some(Err(e)),
        };
        Some(self.mapper.read(&document))
    }
}

impl<T: Mappable> fmt::Debug for ObjectCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCursor")
            .field("type", &T::collection_name())
            .field("inner", &self.inner)
            .finish()
    }
}
