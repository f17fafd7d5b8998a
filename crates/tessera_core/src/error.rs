//! Error types for Tessera core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Tessera core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid or conflicting configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Missing or mismatched credential.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Description of the failure.
        message: String,
    },

    /// Operation not allowed in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of the state violation.
        message: String,
    },

    /// The store has been closed or was never opened.
    #[error("store is closed")]
    StoreClosed,

    /// Another handle holds the store location.
    #[error("store locked: {} is in use by another handle", path.display())]
    StoreLocked {
        /// Path of the locked store.
        path: PathBuf,
    },

    /// The collection or map behind a handle has been dropped.
    #[error("collection {name} has been dropped")]
    CollectionDropped {
        /// Name of the dropped collection.
        name: String,
    },

    /// A document with the same identity already exists.
    #[error("duplicate key {key} in collection {collection}")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// Rendered identity value.
        key: String,
    },

    /// No document exists with the given identity.
    #[error("no document with key {key} in collection {collection}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Rendered identity value.
        key: String,
    },

    /// Record/document conversion failed.
    #[error("cannot map {type_name}: {message}")]
    Mapping {
        /// Name of the record type.
        type_name: String,
        /// Description of the failure, naming the field when there is one.
        message: String,
    },

    /// A record or document lacks a value for its identity field.
    #[error("missing value for identity field {field} in {owner}")]
    MissingIdentity {
        /// Record type or collection name.
        owner: String,
        /// Identity field name.
        field: String,
    },

    /// Persisted metadata was written by an incompatible format version.
    #[error("incompatible store version {}.{}, supported {}.{}", found.0, found.1, supported.0, supported.1)]
    VersionMismatch {
        /// Version recorded in the store.
        found: (u16, u16),
        /// Version this build reads and writes.
        supported: (u16, u16),
    },

    /// The arguments of an operation are not acceptable.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Persisted data failed validation.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tessera_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tessera_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of [`CoreError`] for callers that branch on the
/// kind of failure rather than on its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or conflicting options.
    Configuration,
    /// Missing or mismatched credential.
    Authentication,
    /// Closed store, dropped collection or a rejected argument.
    IllegalState,
    /// Identity already present.
    DuplicateKey,
    /// Identity absent.
    NotFound,
    /// Record/document conversion failure.
    Mapping,
    /// Incompatible persisted metadata.
    VersionMismatch,
    /// Backend-level read/write failure.
    Io,
}

impl CoreError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::IllegalState { .. }
            | Self::StoreClosed
            | Self::CollectionDropped { .. }
            | Self::InvalidOperation { .. } => ErrorKind::IllegalState,
            Self::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Mapping { .. } | Self::MissingIdentity { .. } => ErrorKind::Mapping,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::StoreLocked { .. }
            | Self::Corruption { .. }
            | Self::Storage(_)
            | Self::Codec(_)
            | Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates a mapping error for `type_name`.
    pub fn mapping(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failure_class() {
        assert_eq!(CoreError::StoreClosed.kind(), ErrorKind::IllegalState);
        assert_eq!(
            CoreError::CollectionDropped { name: "a".into() }.kind(),
            ErrorKind::IllegalState
        );
        assert_eq!(
            CoreError::MissingIdentity {
                owner: "Employee".into(),
                field: "id".into()
            }
            .kind(),
            ErrorKind::Mapping
        );
        assert_eq!(
            CoreError::StoreLocked {
                path: PathBuf::from("x.db")
            }
            .kind(),
            ErrorKind::Io
        );
        assert_eq!(
            CoreError::from(io::Error::new(io::ErrorKind::Other, "disk")).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn messages_name_the_subject() {
        let err = CoreError::DuplicateKey {
            collection: "Employee".into(),
            key: "7".into(),
        };
        assert_eq!(err.to_string(), "duplicate key 7 in collection Employee");

        let err = CoreError::VersionMismatch {
            found: (2, 0),
            supported: (1, 0),
        };
        assert_eq!(err.to_string(), "incompatible store version 2.0, supported 1.0");
    }
}
