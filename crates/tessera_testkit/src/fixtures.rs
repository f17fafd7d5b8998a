//! Test fixtures and database helpers.
//!
//! Provides temporary databases for each engine and a way to reopen them
//! at the same location.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tessera_core::{Credential, Database, Document, EngineKind, StoreConfig};

/// Engines that keep data on disk.
pub const PERSISTENT_ENGINES: [EngineKind; 2] = [EngineKind::BTree, EngineKind::Log];

/// Every engine.
pub const ALL_ENGINES: [EngineKind; 3] = [EngineKind::Memory, EngineKind::BTree, EngineKind::Log];

/// File name used for stores inside the temporary directory.
pub const STORE_FILE: &str = "test.tdb";

/// A test database with automatic cleanup.
///
/// File-backed databases disable background commits so tests decide when
/// data becomes durable.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    config: StoreConfig,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::in_memory().expect("Failed to open in-memory database"),
            config: StoreConfig::new(),
            dir: None,
        }
    }

    /// Creates a new database on the given engine.
    pub fn engine(engine: EngineKind) -> Self {
        Self::engine_with(engine, |config| config)
    }

    /// Creates a new database on the given engine after adjusting its
    /// configuration.
    pub fn engine_with(engine: EngineKind, adjust: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        Self::create(engine, adjust, None)
    }

    /// Creates a new file database protected by `credential`.
    pub fn protected(engine: EngineKind, credential: &Credential) -> Self {
        Self::create(engine, |config| config, Some(credential))
    }

    fn create(
        engine: EngineKind,
        adjust: impl FnOnce(StoreConfig) -> StoreConfig,
        credential: Option<&Credential>,
    ) -> Self {
        if !engine.is_persistent() {
            let config = adjust(StoreConfig::new());
            return Self {
                db: open(&config, credential).expect("Failed to open database"),
                config,
                dir: None,
            };
        }

        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = adjust(
            StoreConfig::file(dir.path().join(STORE_FILE))
                .engine(engine)
                .auto_commit(false),
        );
        Self {
            db: open(&config, credential).expect("Failed to open file database"),
            config,
            dir: Some(dir),
        }
    }

    /// Returns the store file, if file-based.
    pub fn path(&self) -> Option<&Path> {
        self.config.file_path.as_deref()
    }

    /// Returns the configuration the database was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Closes the database and opens the same location again.
    ///
    /// An in-memory database comes back empty.
    pub fn reopen(self) -> Self {
        self.reopen_with(None)
    }

    /// Like [`reopen`](Self::reopen), presenting `credential`.
    pub fn reopen_with(self, credential: Option<&Credential>) -> Self {
        let Self { db, config, dir } = self;
        db.close().expect("Failed to close database");
        drop(db);
        Self {
            db: open(&config, credential).expect("Failed to reopen database"),
            config,
            dir,
        }
    }

    /// Closes the database and hands back the location without reopening.
    pub fn close(self) -> ClosedDatabase {
        let Self { db, config, dir } = self;
        db.close().expect("Failed to close database");
        drop(db);
        ClosedDatabase { config, dir }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// The location of a closed [`TestDatabase`].
pub struct ClosedDatabase {
    config: StoreConfig,
    dir: Option<TempDir>,
}

impl ClosedDatabase {
    /// Returns the store file, if file-based.
    pub fn path(&self) -> Option<PathBuf> {
        self.config.file_path.clone()
    }

    /// Returns the configuration the database was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens the location with the same configuration, leaving the
    /// temporary directory in place whatever the outcome.
    pub fn try_open(&self, credential: Option<&Credential>) -> tessera_core::CoreResult<Database> {
        open(&self.config, credential)
    }

    /// Opens the location again with a possibly different configuration.
    pub fn open_with(
        self,
        adjust: impl FnOnce(StoreConfig) -> StoreConfig,
        credential: Option<&Credential>,
    ) -> tessera_core::CoreResult<TestDatabase> {
        let config = adjust(self.config);
        let db = open(&config, credential)?;
        Ok(TestDatabase {
            db,
            config,
            dir: self.dir,
        })
    }
}

fn open(config: &StoreConfig, credential: Option<&Credential>) -> tessera_core::CoreResult<Database> {
    Database::builder()
        .config(config.clone())
        .open_or_create(credential)
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use tessera_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     let collection = db.collection("test").unwrap();
///     assert!(collection.scan().unwrap().next().is_none());
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test once per engine.
pub fn with_each_engine<F>(mut f: F)
where
    F: FnMut(EngineKind, TestDatabase),
{
    for engine in ALL_ENGINES {
        f(engine, TestDatabase::engine(engine));
    }
}

/// Builds a document from top-level fields.
pub fn doc<I, K, V>(fields: I) -> Document
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<tessera_core::Value>,
{
    Document::from_fields(fields)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database whose `numbers` collection holds documents with
    /// `id` 1 through `count` and a `square` field.
    pub fn numbered(engine: EngineKind, count: i64) -> TestDatabase {
        let test_db = TestDatabase::engine(engine);
        {
            let numbers = test_db
                .repository_named::<crate::records::Number>("numbers")
                .expect("Failed to open repository");
            for id in 1..=count {
                numbers
                    .insert(&crate::records::Number::new(id))
                    .expect("Failed to insert number");
            }
        }
        test_db.commit().expect("Failed to commit");
        test_db
    }
}
