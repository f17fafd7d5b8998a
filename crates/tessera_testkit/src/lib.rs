//! # Tessera Testkit
//!
//! Test utilities for Tessera.
//!
//! This crate provides:
//! - Temporary databases for every engine
//! - Record types implementing `Mappable`
//! - Property-based test generators using proptest
//! - Helpers that damage store files the way a crash would
//!
//! ## Usage
//!
//! ```rust
//! use tessera_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let people = db.collection("people").unwrap();
//!     assert_eq!(people.size().unwrap(), 0);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod records;

pub use fixtures::{with_each_engine, with_temp_db, TestDatabase};

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::records::*;
}

/// Installs a log subscriber for tests.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Output goes
/// through the test writer so it is captured per test. Calling this more
/// than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
