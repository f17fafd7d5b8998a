//! Validated store configuration and engine factory.

use super::{BTreeEngine, LogEngine, MemoryEngine, StorageEngine, Store};
use crate::config::{EngineKind, StoreConfig};
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use tessera_storage::{Compressor, Lz4Compressor};

/// A checked [`StoreConfig`] that builds [`Store`]s.
///
/// # Example
///
/// ```rust
/// use tessera_core::{EngineKind, StoreConfig, StoreModule};
///
/// let module = StoreModule::in_memory();
/// assert_eq!(module.engine_kind(), EngineKind::Memory);
///
/// let store = module.build().unwrap();
/// store.open(None).unwrap();
/// assert!(store.is_open());
/// ```
#[derive(Debug, Clone)]
pub struct StoreModule {
    config: StoreConfig,
    engine: EngineKind,
    compressor: Arc<dyn Compressor>,
}

impl StoreModule {
    /// Validates `config` and fixes the engine variant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] for conflicting options, see
    /// [`StoreConfig::validate`].
    pub fn new(config: StoreConfig) -> CoreResult<Self> {
        let engine = config.validate()?;
        Ok(Self {
            config,
            engine,
            compressor: Arc::new(Lz4Compressor::new()),
        })
    }

    /// Module for a volatile in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::new(),
            engine: EngineKind::Memory,
            compressor: Arc::new(Lz4Compressor::new()),
        }
    }

    /// Replaces the compressor used when compression is enabled.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the engine variant [`build`](Self::build) creates.
    #[must_use]
    pub fn engine_kind(&self) -> EngineKind {
        self.engine
    }

    /// Creates a store over a fresh engine. The store is not open yet.
    pub fn build(&self) -> CoreResult<Store> {
        let read_only = self.config.read_only;
        let engine: Arc<dyn StorageEngine> = match self.engine {
            EngineKind::Memory => Arc::new(MemoryEngine::new()),
            EngineKind::BTree => Arc::new(BTreeEngine::new(self.location()?, read_only)),
            EngineKind::Log => Arc::new(LogEngine::new(self.location()?, read_only)),
        };
        Ok(Store::new(
            self.config.clone(),
            self.engine,
            engine,
            Arc::clone(&self.compressor),
        ))
    }

    fn location(&self) -> CoreResult<&std::path::Path> {
        self.config.file_path.as_deref().ok_or_else(|| {
            CoreError::configuration(format!("the {} engine requires a file_path", self.engine))
        })
    }
}
