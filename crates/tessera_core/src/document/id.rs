//! Generated document identifiers.

use std::fmt;
use std::str::FromStr;
use tessera_codec::Value;
use uuid::Uuid;

/// Identifier synthesized for documents that carry no identity of their own.
///
/// Document IDs are random (v4) UUIDs stored as their hyphenated text form
/// in the `_id` field, so they:
/// - are unique within a store for all practical purposes
/// - never change once assigned
/// - order by their text representation in a collection scan
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Creates a new random document ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a document ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Converts to a UUID.
    #[must_use]
    pub const fn to_uuid(&self) -> Uuid {
        self.0
    }

    /// Reads a document ID back from a stored `_id` value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_text().and_then(|s| s.parse().ok())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::Text(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        assert_ne!(DocumentId::new(), DocumentId::new());
    }

    #[test]
    fn text_form_parses_back() {
        let id = DocumentId::new();
        let value = Value::from(id);
        assert_eq!(value.as_text().map(str::len), Some(36));
        assert_eq!(DocumentId::from_value(&value), Some(id));
    }

    #[test]
    fn non_uuid_values_are_not_ids() {
        assert_eq!(DocumentId::from_value(&Value::Integer(1)), None);
        assert_eq!(DocumentId::from_value(&Value::from("not-a-uuid")), None);
    }
}
