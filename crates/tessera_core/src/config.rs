//! Store configuration.

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Storage engine variant backing a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Volatile maps that live only as long as the store.
    Memory,
    /// Ordered tables persisted as an atomic snapshot file.
    #[serde(alias = "b-tree")]
    BTree,
    /// Append-only record log replayed on open.
    Log,
}

impl EngineKind {
    /// Returns the lowercase name of this engine.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::BTree => "btree",
            Self::Log => "log",
        }
    }

    /// Returns whether this engine persists to a file.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "btree" | "b-tree" => Ok(Self::BTree),
            "log" => Ok(Self::Log),
            other => Err(CoreError::configuration(format!(
                "unknown engine '{other}', expected memory, btree or log"
            ))),
        }
    }
}

/// Configuration for building a store.
///
/// Options are validated by [`StoreConfig::validate`], which
/// [`StoreModule::new`](crate::store::StoreModule::new) calls before any
/// engine is constructed.
///
/// # Example
///
/// ```rust
/// use tessera_core::{EngineKind, StoreConfig};
///
/// let config = StoreConfig::file("employees.db")
///     .compress(true)
///     .auto_commit(false);
/// assert_eq!(config.validate().unwrap(), EngineKind::BTree);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// On-disk location, absent for an in-memory store.
    #[serde(alias = "path")]
    pub file_path: Option<PathBuf>,

    /// Engine variant; inferred from `file_path` when absent.
    pub engine: Option<EngineKind>,

    /// Whether values are compressed before they reach the engine.
    pub compress: bool,

    /// Whether a background task commits periodically.
    pub auto_commit: bool,

    /// Seconds between background commits, must be positive.
    pub auto_commit_interval_secs: u64,

    /// Whether the store rejects writes.
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            engine: None,
            compress: false,
            auto_commit: true,
            auto_commit_interval_secs: 1,
            read_only: false,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for an in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for a store at `path`.
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::default().file_path(path)
    }

    /// Sets the on-disk location.
    #[must_use]
    pub fn file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the engine variant explicitly.
    #[must_use]
    pub const fn engine(mut self, kind: EngineKind) -> Self {
        self.engine = Some(kind);
        self
    }

    /// Sets whether values are compressed.
    #[must_use]
    pub const fn compress(mut self, value: bool) -> Self {
        self.compress = value;
        self
    }

    /// Sets whether background commits run.
    #[must_use]
    pub const fn auto_commit(mut self, value: bool) -> Self {
        self.auto_commit = value;
        self
    }

    /// Sets the background commit interval in seconds.
    #[must_use]
    pub const fn auto_commit_interval_secs(mut self, secs: u64) -> Self {
        self.auto_commit_interval_secs = secs;
        self
    }

    /// Sets whether the store rejects writes.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Returns the background commit interval.
    #[must_use]
    pub const fn auto_commit_interval(&self) -> Duration {
        Duration::from_secs(self.auto_commit_interval_secs)
    }

    /// Checks the options for conflicts and returns the engine to build.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] when:
    /// - `read_only` is set without a `file_path`
    /// - a persistent engine is requested without a `file_path`
    /// - the memory engine is requested with a `file_path`
    /// - `auto_commit_interval_secs` is zero
    pub fn validate(&self) -> CoreResult<EngineKind> {
        let engine = self.engine.unwrap_or(if self.file_path.is_some() {
            EngineKind::BTree
        } else {
            EngineKind::Memory
        });

        if self.read_only && self.file_path.is_none() {
            return Err(CoreError::configuration(
                "read_only requires a file_path",
            ));
        }
        if engine.is_persistent() && self.file_path.is_none() {
            return Err(CoreError::configuration(format!(
                "the {engine} engine requires a file_path"
            )));
        }
        if !engine.is_persistent() && self.file_path.is_some() {
            return Err(CoreError::configuration(
                "the memory engine does not take a file_path",
            ));
        }
        if self.file_path.as_deref() == Some(Path::new("")) {
            return Err(CoreError::configuration("file_path is empty"));
        }
        if self.auto_commit_interval_secs == 0 {
            return Err(CoreError::configuration(
                "auto_commit_interval_secs must be positive",
            ));
        }
        Ok(engine)
    }

    /// Builds a configuration from string options, as read from a
    /// properties file or command line.
    ///
    /// Recognized keys are `file_path` (or `path`), `engine`, `compress`,
    /// `auto_commit`, `auto_commit_interval_secs` and `read_only`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] for an unrecognized key or a
    /// value that does not parse. Conflicts are reported later by
    /// [`validate`](Self::validate).
    pub fn from_options<K, V>(options: &[(K, V)]) -> CoreResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "file_path" | "path" => config.file_path = Some(PathBuf::from(value)),
                "engine" => config.engine = Some(value.parse()?),
                "compress" => config.compress = parse_bool(key, value)?,
                "auto_commit" => config.auto_commit = parse_bool(key, value)?,
                "auto_commit_interval_secs" => {
                    config.auto_commit_interval_secs = value.parse().map_err(|_| {
                        CoreError::configuration(format!(
                            "{key} expects a non-negative integer, got '{value}'"
                        ))
                    })?;
                }
                "read_only" => config.read_only = parse_bool(key, value)?,
                other => {
                    return Err(CoreError::configuration(format!(
                        "unrecognized option '{other}'"
                    )))
                }
            }
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> CoreResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(CoreError::configuration(format!(
            "{key} expects a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.file_path.is_none());
        assert!(config.auto_commit);
        assert!(!config.compress);
        assert!(!config.read_only);
        assert_eq!(config.validate().unwrap(), EngineKind::Memory);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::file("data/app.db")
            .engine(EngineKind::Log)
            .compress(true)
            .auto_commit(false)
            .auto_commit_interval_secs(5);

        assert_eq!(config.file_path.as_deref(), Some(Path::new("data/app.db")));
        assert!(config.compress);
        assert!(!config.auto_commit);
        assert_eq!(config.auto_commit_interval(), Duration::from_secs(5));
        assert_eq!(config.validate().unwrap(), EngineKind::Log);
    }

    #[test]
    fn engine_is_inferred_from_path() {
        assert_eq!(
            StoreConfig::file("a.db").validate().unwrap(),
            EngineKind::BTree
        );
    }

    #[test]
    fn conflicting_options_are_rejected() {
        let cases = [
            StoreConfig::new().read_only(true),
            StoreConfig::new().engine(EngineKind::BTree),
            StoreConfig::new().engine(EngineKind::Log),
            StoreConfig::file("a.db").engine(EngineKind::Memory),
            StoreConfig::new().auto_commit_interval_secs(0),
            StoreConfig::file(""),
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{config:?}");
        }
    }

    #[test]
    fn options_are_parsed() {
        let config = StoreConfig::from_options(&[
            ("path", "x.db"),
            ("engine", "LOG"),
            ("compress", "true"),
            ("auto_commit", "no"),
            ("auto_commit_interval_secs", "3"),
            ("read_only", "0"),
        ])
        .unwrap();

        assert_eq!(config.file_path, Some(PathBuf::from("x.db")));
        assert_eq!(config.engine, Some(EngineKind::Log));
        assert!(config.compress);
        assert!(!config.auto_commit);
        assert_eq!(config.auto_commit_interval_secs, 3);
        assert!(!config.read_only);
    }

    #[test]
    fn unknown_or_malformed_options_fail() {
        assert!(matches!(
            StoreConfig::from_options(&[("cache_size", "10")]),
            Err(CoreError::Configuration { .. })
        ));
        assert!(matches!(
            StoreConfig::from_options(&[("compress", "maybe")]),
            Err(CoreError::Configuration { .. })
        ));
        assert!(matches!(
            StoreConfig::from_options(&[("engine", "lsm")]),
            Err(CoreError::Configuration { .. })
        ));
        assert!(matches!(
            StoreConfig::from_options(&[("auto_commit_interval_secs", "-1")]),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{ "file_path": "e.db", "compress": true }"#).unwrap();
        assert_eq!(config.file_path, Some(PathBuf::from("e.db")));
        assert!(config.compress);
        assert!(config.auto_commit);
        assert_eq!(config.auto_commit_interval_secs, 1);

        let config: StoreConfig = serde_json::from_str(r#"{ "engine": "log", "path": "l.db" }"#).unwrap();
        assert_eq!(config.validate().unwrap(), EngineKind::Log);
    }

    #[test]
    fn deserialize_rejects_unknown_fields() {
        let result: Result<StoreConfig, _> = serde_json::from_str(r#"{ "cache": 1 }"#);
        assert!(result.is_err());
    }
}
