//! # Tessera Core
//!
//! Embedded, schema-less document store.
//!
//! This crate provides:
//! - Pluggable storage engines: volatile memory, snapshot B-tree file and
//!   append-only record log
//! - Documents with path-addressed nested fields
//! - Collections keyed by an order-preserving identity encoding
//! - Typed repositories through the [`Mappable`] record mapper
//! - Filters evaluated during lazy, batched scans
//!
//! ```rust
//! use tessera_core::filter::field;
//! use tessera_core::{Database, Document};
//!
//! let db = Database::in_memory().unwrap();
//! let cities = db.collection("cities").unwrap();
//!
//! for (name, population) in [("Oslo", 709_000), ("Bergen", 291_000)] {
//!     let mut doc = Document::new();
//!     doc.put("name", name).unwrap();
//!     doc.put("stats.population", population).unwrap();
//!     cities.insert(&doc).unwrap();
//! }
//!
//! let large = cities.find(field("stats.population").gt(500_000)).unwrap();
//! assert_eq!(large.count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
mod config;
mod database;
pub mod document;
mod error;
pub mod filter;
pub mod mapper;
mod repository;
pub mod store;

pub use collection::{
    Collection, DocumentCursor, Identity, IdentitySource, UpdateOptions, WriteResult,
};
pub use config::{EngineKind, StoreConfig};
pub use database::{Database, DatabaseBuilder};
pub use document::{Document, DocumentId};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use filter::Filter;
pub use mapper::{FieldReader, FieldValue, FieldWriter, Frozen, Mappable, Mapper};
pub use repository::{ObjectCursor, ObjectRepository};
pub use store::{BackendMap, Credential, StorageEngine, Store, StoreInfo, StoreModule};
pub use tessera_codec::Value;
