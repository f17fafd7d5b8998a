//! Database handle.

use crate::collection::{Collection, Identity};
use crate::config::StoreConfig;
use crate::document::DEFAULT_SEPARATOR;
use crate::error::{CoreError, CoreResult};
use crate::mapper::{Mappable, Mapper};
use crate::repository::ObjectRepository;
use crate::store::{Credential, Store, StoreModule};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a builder gets its store from.
#[derive(Debug, Clone)]
enum StoreSource {
    Module(StoreModule),
    Config(StoreConfig),
}

/// Configures and opens a [`Database`].
///
/// ```rust
/// use tessera_core::{Database, StoreModule};
///
/// let db = Database::builder()
///     .field_separator('/')
///     .module(StoreModule::in_memory())
///     .open_or_create(None)
///     .unwrap();
/// assert_eq!(db.field_separator(), '/');
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    separator: char,
    source: StoreSource,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            source: StoreSource::Module(StoreModule::in_memory()),
        }
    }
}

impl DatabaseBuilder {
    /// Creates a builder for an in-memory database with `.` paths.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the character separating segments of field paths.
    #[must_use]
    pub const fn field_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Uses an already validated store module.
    #[must_use]
    pub fn module(mut self, module: StoreModule) -> Self {
        self.source = StoreSource::Module(module);
        self
    }

    /// Uses a store configuration, validated when the database opens.
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.source = StoreSource::Config(config);
        self
    }

    /// Opens the store, creating it when it does not exist.
    ///
    /// A protected store requires its `credential`. A credential given for
    /// an unprotected existing store is rejected; for a new store it
    /// protects the store from now on.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Configuration`] for an invalid separator or store
    ///   configuration
    /// - [`CoreError::Authentication`] for a missing or wrong credential
    /// - [`CoreError::StoreLocked`] if another handle holds the location
    pub fn open_or_create(self, credential: Option<&Credential>) -> CoreResult<Database> {
        validate_separator(self.separator)?;
        let module = match self.source {
            StoreSource::Module(module) => module,
            StoreSource::Config(config) => StoreModule::new(config)?,
        };

        let store = module.build()?;
        store.open(credential)?;
        info!(
            engine = %store.kind(),
            path = ?store.path(),
            separator = %self.separator,
            "database opened"
        );
        Ok(Database {
            store: Arc::new(store),
            mapper: Mapper::new(self.separator),
            collections: RwLock::new(HashMap::new()),
        })
    }
}

fn validate_separator(separator: char) -> CoreResult<()> {
    if separator.is_alphanumeric() || separator.is_whitespace() || separator == '_' {
        return Err(CoreError::configuration(format!(
            "invalid field separator {separator:?}"
        )));
    }
    Ok(())
}

/// An open document database.
///
/// Collections and repositories obtained from a database share its store;
/// after [`close`](Self::close) they fail with [`CoreError::StoreClosed`].
/// Dropping the database closes it.
///
/// ```rust
/// use tessera_core::{Database, Document};
///
/// let db = Database::in_memory().unwrap();
/// let people = db.collection("people").unwrap();
///
/// let mut ada = Document::new();
/// ada.put("name", "Ada").unwrap();
/// let id = people.insert(&ada).unwrap();
///
/// let stored = people.get_by_id(&id).unwrap().unwrap();
/// assert_eq!(stored.get_text("name"), Some("Ada"));
/// db.close().unwrap();
/// ```
pub struct Database {
    store: Arc<Store>,
    mapper: Mapper,
    /// Open collections by name.
    collections: RwLock<HashMap<String, Collection>>,
}

impl Database {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Opens a fresh in-memory database.
    pub fn in_memory() -> CoreResult<Self> {
        DatabaseBuilder::new().open_or_create(None)
    }

    /// Returns the field path separator.
    #[must_use]
    pub fn field_separator(&self) -> char {
        self.mapper.separator()
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn open_collection(&self, name: &str, identity: Identity) -> CoreResult<Collection> {
        if let Some(existing) = self.collections.read().get(name) {
            if !existing.is_dropped() && existing.identity().field() == identity.field() {
                return Ok(existing.clone());
            }
        }

        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            if !existing.is_dropped() && existing.identity().field() == identity.field() {
                return Ok(existing.clone());
            }
        }
        self.store.bind_key_field(name, identity.field())?;
        let map = self.store.map(name)?;
        let collection = Collection::new(
            name,
            map,
            Arc::clone(&self.store),
            identity,
            self.mapper.separator(),
        );
        collections.insert(name.to_string(), collection.clone());
        debug!(collection = name, identity = collection.identity().field(), "collection opened");
        Ok(collection)
    }

    /// Returns the document collection called `name`, creating it on first
    /// use.
    ///
    /// A new collection identifies documents by a generated `_id` field. An
    /// existing one keeps the identity field it was created with, so the
    /// collection behind a repository stays keyed by the record identity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an empty name or one
    /// starting with `$`.
    pub fn collection(&self, name: &str) -> CoreResult<Collection> {
        let identity = match self.store.key_field(name)? {
            Some(field) => Identity::recorded(field),
            None => Identity::synthetic(),
        };
        self.open_collection(name, identity)
    }

    /// Returns the repository of `T`, stored in the collection named by
    /// [`Mappable::collection_name`].
    pub fn repository<T: Mappable>(&self) -> CoreResult<ObjectRepository<T>> {
        self.repository_named(T::collection_name())
    }

    /// Returns a repository of `T` stored in the collection called `name`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Mapping`] if `T` declares an identity field that is not
    ///   one of its fields
    /// - [`CoreError::InvalidOperation`] if the collection is keyed by a
    ///   different identity field
    pub fn repository_named<T: Mappable>(&self, name: &str) -> CoreResult<ObjectRepository<T>> {
        let identity = self.mapper.identity::<T>()?;
        let collection = self.open_collection(name, identity)?;
        Ok(ObjectRepository::new(collection, self.mapper))
    }

    /// Returns whether a collection called `name` exists.
    pub fn has_collection(&self, name: &str) -> CoreResult<bool> {
        self.store.has_map(name)
    }

    /// Returns the names of every collection, in order.
    pub fn list_collection_names(&self) -> CoreResult<Vec<String>> {
        self.store.map_names()
    }

    /// Deletes the collection called `name` and its documents.
    ///
    /// Open handles to the collection fail from now on.
    pub fn destroy_collection(&self, name: &str) -> CoreResult<()> {
        self.store.drop_map(name)?;
        self.collections.write().remove(name);
        Ok(())
    }

    /// Makes every write so far durable.
    pub fn commit(&self) -> CoreResult<()> {
        self.store.commit()
    }

    /// Commits and closes the database. Closing twice does nothing.
    pub fn close(&self) -> CoreResult<()> {
        if self.store.is_closed() {
            return Ok(());
        }
        self.collections.write().clear();
        self.store.close()
    }

    /// Returns whether the database has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("store", &self.store)
            .field("separator", &self.mapper.separator())
            .field("collections", &self.collections.read().len())
            .finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close database on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineKind;
    use crate::document::Document;
    use crate::error::ErrorKind;
    use crate::filter::field;
    use crate::mapper::{FieldReader, FieldWriter};
    use tempfile::tempdir;

    #[derive(Debug, PartialEq)]
    struct City {
        id: i64,
        name: String,
    }

    impl Mappable for City {
        fn fields() -> &'static [&'static str] {
            &["id", "name"]
        }

        fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
            out.put("id", &self.id)?;
            out.put("name", &self.name)
        }

        fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
            Ok(Self {
                id: input.required("id")?,
                name: input.required("name")?,
            })
        }
    }

    fn named(name: &str) -> Document {
        let mut doc = Document::new();
        doc.put("name", name).unwrap();
        doc
    }

    #[test]
    fn collections_are_shared_by_name() {
        let db = Database::in_memory().unwrap();
        let first = db.collection("people").unwrap();
        let second = db.collection("people").unwrap();

        first.insert(&named("Ada")).unwrap();
        assert_eq!(second.size().unwrap(), 1);
        assert!(db.has_collection("people").unwrap());
        assert!(!db.has_collection("places").unwrap());
    }

    #[test]
    fn collection_names_are_listed_in_order() {
        let db = Database::in_memory().unwrap();
        db.collection("b").unwrap();
        db.collection("a").unwrap();
        db.repository::<City>().unwrap();
        assert_eq!(db.list_collection_names().unwrap(), ["City", "a", "b"]);
    }

    #[test]
    fn reserved_collection_names_are_rejected() {
        let db = Database::in_memory().unwrap();
        assert!(db.collection("").is_err());
        let err = db.collection("$store_info").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn destroy_invalidates_open_handles() {
        let db = Database::in_memory().unwrap();
        let people = db.collection("people").unwrap();
        people.insert(&named("Ada")).unwrap();

        db.destroy_collection("people").unwrap();
        assert!(people.is_dropped());
        assert_eq!(people.size().unwrap_err().kind(), ErrorKind::IllegalState);
        assert!(!db.has_collection("people").unwrap());

        let again = db.collection("people").unwrap();
        assert_eq!(again.size().unwrap(), 0);
    }

    #[test]
    fn repositories_use_the_type_name() {
        let db = Database::in_memory().unwrap();
        let cities = db.repository::<City>().unwrap();
        cities
            .insert(&City {
                id: 1,
                name: "Oslo".into(),
            })
            .unwrap();
        assert_eq!(cities.collection().name(), "City");

        let raw = db.collection("City").unwrap();
        assert_eq!(raw.find(field("name").eq("Oslo")).unwrap().count(), 1);

        let other = db.repository_named::<City>("capitals").unwrap();
        assert_eq!(other.size().unwrap(), 0);
    }

    #[test]
    fn collections_keep_their_identity_field() {
        let db = Database::in_memory().unwrap();
        let cities = db.repository::<City>().unwrap();
        cities
            .insert(&City {
                id: 1,
                name: "Oslo".into(),
            })
            .unwrap();

        let raw = db.collection("City").unwrap();
        assert_eq!(raw.identity().field(), "id");
        let mut twin = named("Also Oslo");
        twin.put("id", 1).unwrap();
        assert_eq!(raw.insert(&twin).unwrap_err().kind(), ErrorKind::DuplicateKey);
        assert_eq!(cities.size().unwrap(), 1);

        db.collection("people").unwrap();
        let err = db.repository_named::<City>("people").unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        db.destroy_collection("people").unwrap();
        assert!(db.repository_named::<City>("people").is_ok());
    }

    #[test]
    fn identity_field_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cities.db");
        let config = StoreConfig::file(&path).auto_commit(false);
        {
            let db = Database::builder().config(config.clone()).open_or_create(None).unwrap();
            db.repository::<City>().unwrap();
            db.close().unwrap();
        }

        let db = Database::builder().config(config).open_or_create(None).unwrap();
        assert_eq!(db.collection("City").unwrap().identity().field(), "id");
    }

    #[test]
    fn invalid_separators_are_rejected() {
        for separator in ['a', '7', ' ', '_'] {
            let err = Database::builder()
                .field_separator(separator)
                .open_or_create(None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn separator_reaches_collections() {
        let db = Database::builder()
            .field_separator(':')
            .open_or_create(None)
            .unwrap();
        let places = db.collection("places").unwrap();
        let mut doc = Document::with_separator(':');
        doc.put("address:city", "Oslo").unwrap();
        let id = places.insert(&doc).unwrap();

        let stored = places.get_by_id(&id).unwrap().unwrap();
        assert_eq!(stored.get_text("address:city"), Some("Oslo"));
        assert_eq!(places.find(field("address:city").eq("Oslo")).unwrap().count(), 1);
    }

    #[test]
    fn close_is_terminal() {
        let db = Database::in_memory().unwrap();
        let people = db.collection("people").unwrap();
        db.close().unwrap();
        db.close().unwrap();
        assert!(db.is_closed());

        let err = people.insert(&named("Ada")).unwrap_err();
        assert!(matches!(err, CoreError::StoreClosed));
        assert!(matches!(db.collection("x"), Err(CoreError::StoreClosed)));
    }

    #[test]
    fn config_is_validated_on_open() {
        let err = Database::builder()
            .config(StoreConfig::new().engine(EngineKind::Log))
            .open_or_create(None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn reopened_database_sees_committed_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.db");
        let id = {
            let db = Database::builder()
                .config(StoreConfig::file(&path).auto_commit(false))
                .open_or_create(None)
                .unwrap();
            let id = db.collection("people").unwrap().insert(&named("Ada")).unwrap();
            db.commit().unwrap();
            id
        };

        let db = Database::builder()
            .config(StoreConfig::file(&path))
            .open_or_create(None)
            .unwrap();
        assert_eq!(db.store().kind(), EngineKind::BTree);
        assert_eq!(db.list_collection_names().unwrap(), ["people"]);
        let stored = db.collection("people").unwrap().get_by_id(&id).unwrap();
        assert_eq!(stored.unwrap().get_text("name"), Some("Ada"));
    }
}
