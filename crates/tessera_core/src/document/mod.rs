//! Self-describing documents.
//!
//! A [`Document`] is an ordered mapping from field names to [`Value`]s.
//! Nested documents are stored as map values and addressed with dotted
//! paths such as `address.city`; the separator is configurable per database.

mod id;

pub use id::DocumentId;

use crate::error::{CoreError, CoreResult};
use tessera_codec::{from_cbor, to_cbor, Value};

/// Separator used in field paths unless a database configures another.
pub const DEFAULT_SEPARATOR: char = '.';

/// Field holding the synthesized identity of documents without one.
pub const ID_FIELD: &str = "_id";

/// An ordered, schema-less set of fields.
///
/// Field order is the order of first insertion and is kept through storage.
/// Equality compares fields only, not the path separator.
///
/// # Example
///
/// ```rust
/// use tessera_core::Document;
///
/// let mut doc = Document::new();
/// doc.put("name", "Ada").unwrap();
/// doc.put("address.city", "London").unwrap();
///
/// assert_eq!(doc.get_text("address.city"), Some("London"));
/// assert_eq!(doc.fields(), vec!["name", "address.city"]);
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    fields: Vec<(String, Value)>,
    separator: char,
}

impl Document {
    /// Creates an empty document using the default separator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    /// Creates an empty document that splits paths on `separator`.
    #[must_use]
    pub fn with_separator(separator: char) -> Self {
        Self {
            fields: Vec::new(),
            separator,
        }
    }

    /// Creates a document from top-level fields. Names are not split.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut doc = Self::new();
        for (name, value) in fields {
            doc.set_field(name.into(), value.into());
        }
        doc
    }

    /// Returns the path separator.
    #[must_use]
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Changes the path separator used by later path lookups.
    pub fn set_separator(&mut self, separator: char) {
        self.separator = separator;
    }

    /// Stores `value` at `path`, creating intermediate documents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the path or one of its
    /// segments is empty, or if an intermediate field holds a non-document
    /// value.
    pub fn put(&mut self, path: &str, value: impl Into<Value>) -> CoreResult<()> {
        let segments = self.split(path)?;
        let value = value.into();
        match segments.as_slice() {
            [] => Err(CoreError::invalid_operation("empty field path")),
            [name] => {
                self.set_field((*name).to_string(), value);
                Ok(())
            }
            [first, rest @ ..] => {
                let index = match self.position(first) {
                    Some(index) => index,
                    None => {
                        self.fields
                            .push(((*first).to_string(), Value::Map(Vec::new())));
                        self.fields.len() - 1
                    }
                };
                put_nested(&mut self.fields[index].1, rest, value, path)
            }
        }
    }

    /// Returns the top-level field `name` without splitting it.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Sets the top-level field `name` without splitting it.
    pub fn put_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.set_field(name.into(), value.into());
    }

    /// Removes the top-level field `name` without splitting it.
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        let index = self.position(name)?;
        Some(self.fields.remove(index).1)
    }

    /// Returns the value at `path`, if every segment resolves.
    ///
    /// Numeric segments index into arrays, so `tags.0` is the first tag.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split(self.separator);
        let first = segments.next()?;
        let top = self.fields.iter().find(|(k, _)| k == first).map(|(_, v)| v)?;
        segments.try_fold(top, |value, segment| lookup(value, segment))
    }

    /// Removes and returns the value at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split(self.separator).collect();
        match segments.as_slice() {
            [] => None,
            [name] => self.remove_field(name),
            [first, rest @ ..] => {
                let index = self.position(first)?;
                remove_nested(&mut self.fields[index].1, rest)
            }
        }
    }

    /// Returns whether a value exists at `path`.
    #[must_use]
    pub fn contains_key(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Returns the path of every leaf field, nested documents expanded.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, value) in &self.fields {
            collect_paths(name.clone(), value, self.separator, &mut out);
        }
        out
    }

    /// Iterates over top-level field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over top-level fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the text at `path`.
    #[must_use]
    pub fn get_text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_text)
    }

    /// Returns the integer at `path`.
    #[must_use]
    pub fn get_integer(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_integer)
    }

    /// Returns the number at `path` as a float.
    #[must_use]
    pub fn get_float(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_float)
    }

    /// Returns the boolean at `path`.
    #[must_use]
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Returns the array at `path`.
    #[must_use]
    pub fn get_array(&self, path: &str) -> Option<&[Value]> {
        self.get(path).and_then(Value::as_array)
    }

    /// Returns a copy of the nested document at `path`.
    #[must_use]
    pub fn get_document(&self, path: &str) -> Option<Document> {
        match self.get(path)? {
            value @ Value::Map(_) => Self::from_value(value.clone(), self.separator).ok(),
            _ => None,
        }
    }

    /// Returns the synthesized identity stored in `_id`, if any.
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        self.get_field(ID_FIELD).and_then(DocumentId::from_value)
    }

    /// Merges `patch` into this document.
    ///
    /// Nested documents merge field by field; any other value in the patch
    /// replaces the current one.
    pub fn merge(&mut self, patch: &Document) {
        for (name, value) in &patch.fields {
            match self.position(name) {
                Some(index) => merge_value(&mut self.fields[index].1, value),
                None => self.fields.push((name.clone(), value.clone())),
            }
        }
    }

    /// Converts this document to a map value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.fields
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
                .collect(),
        )
    }

    /// Builds a document from a map value with text keys.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corruption`] if `value` is not a map or has a
    /// non-text key.
    pub fn from_value(value: Value, separator: char) -> CoreResult<Self> {
        let Value::Map(pairs) = value else {
            return Err(CoreError::corruption(format!(
                "expected a document, found {}",
                value.type_name()
            )));
        };
        let mut fields = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match key {
                Value::Text(name) => fields.push((name, value)),
                other => {
                    return Err(CoreError::corruption(format!(
                        "document field name is {}, not text",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(Self { fields, separator })
    }

    /// Encodes this document as CBOR.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(to_cbor(&self.to_value())?)
    }

    /// Decodes a document from CBOR.
    pub fn from_bytes(bytes: &[u8], separator: char) -> CoreResult<Self> {
        Self::from_value(from_cbor(bytes)?, separator)
    }

    fn split<'p>(&self, path: &'p str) -> CoreResult<Vec<&'p str>> {
        if path.is_empty() {
            return Err(CoreError::invalid_operation("empty field path"));
        }
        let segments: Vec<&str> = path.split(self.separator).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::invalid_operation(format!(
                "field path '{path}' has an empty segment"
            )));
        }
        Ok(segments)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(k, _)| k == name)
    }

    fn set_field(&mut self, name: String, value: Value) {
        match self.position(&name) {
            Some(index) => self.fields[index].1 = value,
            None => self.fields.push((name, value)),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Map(
            doc.fields
                .into_iter()
                .map(|(k, v)| (Value::Text(k), v))
                .collect(),
        )
    }
}

fn lookup<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Map(_) => value.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn map_position(pairs: &[(Value, Value)], name: &str) -> Option<usize> {
    pairs.iter().position(|(k, _)| k.as_text() == Some(name))
}

fn put_nested(target: &mut Value, segments: &[&str], value: Value, path: &str) -> CoreResult<()> {
    if target.is_null() {
        *target = Value::Map(Vec::new());
    }
    let found = target.type_name();
    let Value::Map(pairs) = target else {
        return Err(CoreError::invalid_operation(format!(
            "cannot put '{path}': an intermediate field holds {found}"
        )));
    };
    match segments {
        [] => Err(CoreError::invalid_operation("empty field path")),
        [name] => {
            match map_position(pairs, name) {
                Some(index) => pairs[index].1 = value,
                None => pairs.push((Value::Text((*name).to_string()), value)),
            }
            Ok(())
        }
        [first, rest @ ..] => {
            let index = match map_position(pairs, first) {
                Some(index) => index,
                None => {
                    pairs.push((Value::Text((*first).to_string()), Value::Map(Vec::new())));
                    pairs.len() - 1
                }
            };
            put_nested(&mut pairs[index].1, rest, value, path)
        }
    }
}

fn remove_nested(target: &mut Value, segments: &[&str]) -> Option<Value> {
    let Value::Map(pairs) = target else {
        return None;
    };
    match segments {
        [] => None,
        [name] => {
            let index = map_position(pairs, name)?;
            Some(pairs.remove(index).1)
        }
        [first, rest @ ..] => {
            let index = map_position(pairs, first)?;
            remove_nested(&mut pairs[index].1, rest)
        }
    }
}

fn collect_paths(path: String, value: &Value, separator: char, out: &mut Vec<String>) {
    match value {
        Value::Map(pairs) if !pairs.is_empty() => {
            for (key, nested) in pairs {
                if let Some(key) = key.as_text() {
                    collect_paths(format!("{path}{separator}{key}"), nested, separator, out);
                }
            }
        }
        _ => out.push(path),
    }
}

fn merge_value(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Map(current), Value::Map(incoming)) => {
            for (key, value) in incoming {
                match current.iter_mut().find(|(k, _)| k == key) {
                    Some((_, existing)) => merge_value(existing, value),
                    None => current.push((key.clone(), value.clone())),
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> Document {
        let mut doc = Document::new();
        doc.put("id", 1).unwrap();
        doc.put("name", "Ada").unwrap();
        doc.put("address.city", "London").unwrap();
        doc.put("address.geo.lat", 51.5).unwrap();
        doc.put("tags", vec![Value::from("math"), Value::from("poetry")])
            .unwrap();
        doc
    }

    #[test]
    fn dotted_put_creates_intermediate_documents() {
        let doc = employee();
        assert_eq!(doc.get_text("address.city"), Some("London"));
        assert_eq!(doc.get_float("address.geo.lat"), Some(51.5));
        assert!(doc.get_document("address").is_some());
        assert_eq!(doc.len(), 4);
    }

    #[test]
    fn missing_segments_yield_none() {
        let doc = employee();
        assert_eq!(doc.get("address.zip"), None);
        assert_eq!(doc.get("name.first"), None);
        assert_eq!(doc.get("nothing.at.all"), None);
        assert_eq!(doc.get(""), None);
    }

    #[test]
    fn numeric_segments_index_arrays() {
        let doc = employee();
        assert_eq!(doc.get_text("tags.1"), Some("poetry"));
        assert_eq!(doc.get("tags.2"), None);
    }

    #[test]
    fn empty_paths_are_rejected() {
        let mut doc = Document::new();
        assert!(matches!(
            doc.put("", 1),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            doc.put("a..b", 1),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn put_through_a_scalar_fails() {
        let mut doc = employee();
        assert!(matches!(
            doc.put("name.first", "A"),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut doc = Document::new();
        doc.put("z", 1).unwrap();
        doc.put("a", 2).unwrap();
        doc.put("m", 3).unwrap();
        doc.put("a", 4).unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["z", "a", "m"]);
        assert_eq!(doc.get_integer("a"), Some(4));
    }

    #[test]
    fn fields_lists_leaf_paths() {
        assert_eq!(
            employee().fields(),
            ["id", "name", "address.city", "address.geo.lat", "tags"]
        );
    }

    #[test]
    fn remove_nested_field() {
        let mut doc = employee();
        assert_eq!(doc.remove("address.geo.lat"), Some(Value::Float(51.5)));
        assert!(!doc.contains_key("address.geo.lat"));
        assert!(doc.contains_key("address.geo"));
        assert_eq!(doc.remove("address.zip"), None);
        assert_eq!(doc.remove("name"), Some(Value::from("Ada")));
        assert!(!doc.contains_key("name"));
    }

    #[test]
    fn custom_separator() {
        let mut doc = Document::with_separator(':');
        doc.put("a:b", true).unwrap();
        doc.put("x.y", 1).unwrap();
        assert_eq!(doc.get_bool("a:b"), Some(true));
        assert_eq!(doc.get_integer("x.y"), Some(1));
        assert_eq!(doc.fields(), ["a:b", "x.y"]);
    }

    #[test]
    fn merge_is_deep() {
        let mut doc = employee();
        let mut patch = Document::new();
        patch.put("address.zip", "NW1").unwrap();
        patch.put("name", "Ada Lovelace").unwrap();
        doc.merge(&patch);

        assert_eq!(doc.get_text("name"), Some("Ada Lovelace"));
        assert_eq!(doc.get_text("address.city"), Some("London"));
        assert_eq!(doc.get_text("address.zip"), Some("NW1"));
    }

    #[test]
    fn bytes_round_trip_keeps_order_and_values() {
        let doc = employee();
        let bytes = doc.to_bytes().unwrap();
        let back = Document::from_bytes(&bytes, DEFAULT_SEPARATOR).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.fields(), doc.fields());
    }

    #[test]
    fn non_documents_do_not_decode() {
        let bytes = to_cbor(&Value::Integer(3)).unwrap();
        assert!(matches!(
            Document::from_bytes(&bytes, DEFAULT_SEPARATOR),
            Err(CoreError::Corruption { .. })
        ));
    }

    #[test]
    fn synthesized_id_is_readable() {
        let id = DocumentId::new();
        let doc = Document::from_fields([(ID_FIELD, Value::from(id))]);
        assert_eq!(doc.id(), Some(id));
    }
}
