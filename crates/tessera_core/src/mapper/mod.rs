//! Conversion between typed records and documents.
//!
//! A record type describes itself through [`Mappable`]: the names of its
//! persisted fields, an optional identity field, and a pair of functions
//! that write fields into a [`FieldWriter`] and rebuild the record from a
//! [`FieldReader`]. The [`Mapper`] checks both directions against the
//! declared field list, so a document always carries every declared field in
//! declaration order.
//!
//! Fields that must not change after construction are held in a [`Frozen`]
//! cell. It has no public setter; [`FieldReader::restore`] is the only way to
//! write one after it was built, and it writes exactly the named field.
//!
//! ```rust
//! use tessera_core::mapper::{FieldReader, FieldWriter, Frozen, Mappable, Mapper};
//! use tessera_core::CoreResult;
//!
//! #[derive(Debug, PartialEq)]
//! struct Badge {
//!     number: Frozen<i64>,
//!     holder: String,
//! }
//!
//! impl Mappable for Badge {
//!     fn fields() -> &'static [&'static str] {
//!         &["number", "holder"]
//!     }
//!
//!     fn id_field() -> Option<&'static str> {
//!         Some("number")
//!     }
//!
//!     fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
//!         out.put("number", self.number.get())?;
//!         out.put("holder", &self.holder)
//!     }
//!
//!     fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
//!         let mut badge = Badge {
//!             number: Frozen::default(),
//!             holder: input.required("holder")?,
//!         };
//!         input.restore("number", &mut badge.number)?;
//!         Ok(badge)
//!     }
//! }
//!
//! let mapper = Mapper::default();
//! let badge = Badge { number: Frozen::new(7), holder: "Ada".into() };
//! let doc = mapper.write(&badge).unwrap();
//! assert_eq!(doc.fields(), vec!["number", "holder"]);
//! assert_eq!(mapper.read::<Badge>(&doc).unwrap(), badge);
//! ```

mod convert;

pub use convert::FieldValue;

use crate::collection::{Identity, CONVENTION_ID_FIELD};
use crate::document::{Document, DEFAULT_SEPARATOR};
use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::ops::Deref;
use tessera_codec::Value;

/// A record type that can be stored as a document.
pub trait Mappable: Sized {
    /// Persisted field names in declaration order.
    fn fields() -> &'static [&'static str];

    /// The field identifying records, if the type declares one.
    ///
    /// It must be one of [`fields`](Self::fields). Types that declare none
    /// use a field called `id` when they have one, otherwise a generated
    /// `_id`.
    fn id_field() -> Option<&'static str> {
        None
    }

    /// Default collection name for repositories of this type.
    fn collection_name() -> &'static str {
        short_type_name::<Self>()
    }

    /// Writes every persisted field.
    fn write(&self, out: &mut FieldWriter) -> CoreResult<()>;

    /// Builds a new record from stored fields.
    fn read(input: &FieldReader<'_>) -> CoreResult<Self>;
}

/// The last path segment of a type name, without generic arguments.
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Collects the fields a record writes.
#[derive(Debug)]
pub struct FieldWriter {
    type_name: &'static str,
    separator: char,
    fields: Vec<(&'static str, Value)>,
}

impl FieldWriter {
    fn new(type_name: &'static str, separator: char) -> Self {
        Self {
            type_name,
            separator,
            fields: Vec::new(),
        }
    }

    /// Writes one field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the field was already written.
    pub fn put<V: FieldValue>(&mut self, name: &'static str, value: &V) -> CoreResult<()> {
        self.push(name, value.to_value())
    }

    /// Writes a nested record as a sub-document.
    pub fn put_nested<M: Mappable>(&mut self, name: &'static str, value: &M) -> CoreResult<()> {
        let doc = Mapper::new(self.separator).write(value)?;
        self.push(name, doc.to_value())
    }

    fn push(&mut self, name: &'static str, value: Value) -> CoreResult<()> {
        if self.fields.iter().any(|(n, _)| *n == name) {
            return Err(CoreError::mapping(
                self.type_name,
                format!("field {name} written twice"),
            ));
        }
        self.fields.push((name, value));
        Ok(())
    }
}

/// Read access to a stored document while a record is rebuilt.
pub struct FieldReader<'a> {
    type_name: &'static str,
    document: &'a Document,
    separator: char,
}

impl<'a> FieldReader<'a> {
    fn new(type_name: &'static str, document: &'a Document, separator: char) -> Self {
        Self {
            type_name,
            document,
            separator,
        }
    }

    /// Returns the document being read.
    #[must_use]
    pub fn document(&self) -> &'a Document {
        self.document
    }

    fn error(&self, message: String) -> CoreError {
        CoreError::mapping(self.type_name, message)
    }

    fn convert<V: FieldValue>(&self, name: &str, value: &Value) -> CoreResult<V> {
        V::from_value(value).ok_or_else(|| {
            self.error(format!(
                "field {name}: expected {}, found {}",
                V::EXPECTED,
                value.type_name()
            ))
        })
    }

    /// Reads a field that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] naming the field if it is missing or
    /// holds a value that does not convert to `V`.
    pub fn required<V: FieldValue>(&self, name: &str) -> CoreResult<V> {
        let value = self
            .document
            .get_field(name)
            .ok_or_else(|| self.error(format!("field {name} is missing")))?;
        self.convert(name, value)
    }

    /// Reads a field that may be missing or null.
    pub fn optional<V: FieldValue>(&self, name: &str) -> CoreResult<Option<V>> {
        match self.document.get_field(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.convert(name, value).map(Some),
        }
    }

    /// Reads a nested record stored as a sub-document.
    pub fn nested<M: Mappable>(&self, name: &str) -> CoreResult<M> {
        let value = self
            .document
            .get_field(name)
            .ok_or_else(|| self.error(format!("field {name} is missing")))?;
        if !matches!(value, Value::Map(_)) {
            return Err(self.error(format!(
                "field {name}: expected document, found {}",
                value.type_name()
            )));
        }
        let inner = Document::from_value(value.clone(), self.separator)?;
        Mapper::new(self.separator).read(&inner)
    }

    /// Writes the stored value of `name` into a [`Frozen`] field.
    ///
    /// Only the given cell is touched; on error it keeps its old value.
    pub fn restore<V: FieldValue>(&self, name: &str, cell: &mut Frozen<V>) -> CoreResult<()> {
        let value = self.required(name)?;
        cell.restore(value);
        Ok(())
    }

    /// Reads a field straight into a new [`Frozen`] cell.
    pub fn frozen<V: FieldValue>(&self, name: &str) -> CoreResult<Frozen<V>> {
        self.required(name).map(Frozen::new)
    }
}

impl fmt::Debug for FieldReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldReader")
            .field("type_name", &self.type_name)
            .field("fields", &self.document.len())
            .finish()
    }
}

/// A field that is fixed once the record is built.
///
/// Readable through [`get`](Self::get) or `Deref`. There is no public setter:
/// after construction only [`FieldReader::restore`] writes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frozen<T>(T);

impl<T> Frozen<T> {
    /// Creates the cell.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Returns the value.
    pub const fn get(&self) -> &T {
        &self.0
    }

    /// Consumes the cell and returns the value.
    pub fn into_inner(self) -> T {
        self.0
    }

    pub(crate) fn restore(&mut self, value: T) {
        self.0 = value;
    }
}

impl<T> Deref for Frozen<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> From<T> for Frozen<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

/// Converts records to documents and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapper {
    separator: char,
}

impl Mapper {
    /// Creates a mapper producing documents with the given path separator.
    #[must_use]
    pub const fn new(separator: char) -> Self {
        Self { separator }
    }

    /// Returns the path separator of produced documents.
    #[must_use]
    pub const fn separator(&self) -> char {
        self.separator
    }

    /// Converts `record` into a document holding every declared field in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the record writes an undeclared
    /// field or leaves a declared one out.
    pub fn write<T: Mappable>(&self, record: &T) -> CoreResult<Document> {
        let type_name = short_type_name::<T>();
        let mut out = FieldWriter::new(type_name, self.separator);
        record.write(&mut out)?;

        let declared = T::fields();
        if let Some((name, _)) = out.fields.iter().find(|(n, _)| !declared.contains(n)) {
            return Err(CoreError::mapping(
                type_name,
                format!("field {name} is not declared"),
            ));
        }

        let mut doc = Document::with_separator(self.separator);
        for name in declared {
            let index = out
                .fields
                .iter()
                .position(|(n, _)| n == name)
                .ok_or_else(|| {
                    CoreError::mapping(type_name, format!("field {name} was not written"))
                })?;
            let (_, value) = out.fields.swap_remove(index);
            doc.put_field(*name, value);
        }
        Ok(doc)
    }

    /// Builds a new `T` from `document`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] naming the type and field when a field
    /// is missing or does not convert. No partially built record is ever
    /// returned.
    pub fn read<T: Mappable>(&self, document: &Document) -> CoreResult<T> {
        T::read(&FieldReader::new(
            short_type_name::<T>(),
            document,
            self.separator,
        ))
    }

    /// Resolves the identity field of `T`.
    ///
    /// A declared identity wins, then a field called `id`, then the
    /// generated `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Mapping`] if the declared identity is not one of
    /// the declared fields.
    pub fn identity<T: Mappable>(&self) -> CoreResult<Identity> {
        let fields = T::fields();
        match T::id_field() {
            Some(field) if fields.contains(&field) => Ok(Identity::declared(field)),
            Some(field) => Err(CoreError::mapping(
                short_type_name::<T>(),
                format!("identity field {field} is not a declared field"),
            )),
            None if fields.contains(&CONVENTION_ID_FIELD) => Ok(Identity::convention()),
            None => Ok(Identity::synthetic()),
        }
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::IdentitySource;
    use crate::error::ErrorKind;
    use bytes::Bytes;

    #[derive(Debug, Clone, PartialEq)]
    struct Address {
        street: String,
        zip: Option<u32>,
    }

    impl Mappable for Address {
        fn fields() -> &'static [&'static str] {
            &["street", "zip"]
        }

        fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
            out.put("street", &self.street)?;
            out.put("zip", &self.zip)
        }

        fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
            Ok(Self {
                street: input.required("street")?,
                zip: input.optional("zip")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Employee {
        emp_id: Frozen<i64>,
        name: String,
        address: Address,
        photo: Bytes,
        scores: Vec<f64>,
    }

    impl Mappable for Employee {
        fn fields() -> &'static [&'static str] {
            &["emp_id", "name", "address", "photo", "scores"]
        }

        fn id_field() -> Option<&'static str> {
            Some("emp_id")
        }

        fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
            out.put("emp_id", self.emp_id.get())?;
            out.put("name", &self.name)?;
            out.put_nested("address", &self.address)?;
            out.put("photo", &self.photo)?;
            out.put("scores", &self.scores)
        }

        fn read(input: &FieldReader<'_>) -> CoreResult<Self> {
            let mut employee = Self {
                emp_id: Frozen::default(),
                name: input.required("name")?,
                address: input.nested("address")?,
                photo: input.required("photo")?,
                scores: input.required("scores")?,
            };
            input.restore("emp_id", &mut employee.emp_id)?;
            Ok(employee)
        }
    }

    fn employee() -> Employee {
        Employee {
            emp_id: Frozen::new(12),
            name: "Ada".to_string(),
            address: Address {
                street: "1 Loop Rd".to_string(),
                zip: None,
            },
            photo: Bytes::from_static(&[0xca, 0xfe]),
            scores: vec![1.5, 2.0],
        }
    }

    struct Sloppy {
        extra: bool,
    }

    impl Mappable for Sloppy {
        fn fields() -> &'static [&'static str] {
            &["id", "name"]
        }

        fn write(&self, out: &mut FieldWriter) -> CoreResult<()> {
            out.put("id", &1i64)?;
            if self.extra {
                out.put("nickname", &"x".to_string())?;
            }
            Ok(())
        }

        fn read(_input: &FieldReader<'_>) -> CoreResult<Self> {
            Ok(Self { extra: false })
        }
    }

    struct Misdeclared;

    impl Mappable for Misdeclared {
        fn fields() -> &'static [&'static str] {
            &["key"]
        }

        fn id_field() -> Option<&'static str> {
            Some("code")
        }

        fn write(&self, _out: &mut FieldWriter) -> CoreResult<()> {
            Ok(())
        }

        fn read(_input: &FieldReader<'_>) -> CoreResult<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn write_follows_declaration_order() {
        let doc = Mapper::default().write(&employee()).unwrap();
        let top: Vec<&str> = doc.keys().collect();
        assert_eq!(top, ["emp_id", "name", "address", "photo", "scores"]);
        assert_eq!(doc.get_text("address.street"), Some("1 Loop Rd"));
        assert_eq!(doc.get("address.zip"), Some(&Value::Null));
    }

    #[test]
    fn read_restores_frozen_fields() {
        let mapper = Mapper::default();
        let original = employee();
        let back: Employee = mapper.read(&mapper.write(&original).unwrap()).unwrap();
        assert_eq!(back, original);
        assert_eq!(*back.emp_id, 12);
    }

    #[test]
    fn missing_field_names_type_and_field() {
        let mapper = Mapper::default();
        let mut doc = mapper.write(&employee()).unwrap();
        doc.remove("name");

        match mapper.read::<Employee>(&doc).unwrap_err() {
            CoreError::Mapping { type_name, message } => {
                assert_eq!(type_name, "Employee");
                assert!(message.contains("name"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_a_mapping_error() {
        let mapper = Mapper::default();
        let mut doc = mapper.write(&employee()).unwrap();
        doc.put("emp_id", "twelve").unwrap();
        let err = mapper.read::<Employee>(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mapping);
        assert!(err.to_string().contains("emp_id"));

        let mut doc = mapper.write(&employee()).unwrap();
        doc.put("address", 5).unwrap();
        assert!(mapper.read::<Employee>(&doc).is_err());
    }

    #[test]
    fn failed_restore_keeps_the_cell() {
        let doc = Document::new();
        let reader = FieldReader::new("Test", &doc, '.');
        let mut cell = Frozen::new(5i64);
        assert!(reader.restore("missing", &mut cell).is_err());
        assert_eq!(*cell.get(), 5);
    }

    #[test]
    fn undeclared_and_unwritten_fields_are_rejected() {
        let mapper = Mapper::default();
        let err = mapper.write(&Sloppy { extra: true }).unwrap_err();
        assert!(err.to_string().contains("nickname"));

        let err = mapper.write(&Sloppy { extra: false }).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn identity_resolution() {
        let mapper = Mapper::default();
        assert_eq!(
            mapper.identity::<Employee>().unwrap(),
            Identity::declared("emp_id")
        );
        assert_eq!(
            mapper.identity::<Sloppy>().unwrap().source(),
            IdentitySource::Convention
        );
        assert!(mapper.identity::<Address>().unwrap().is_synthetic());
        assert_eq!(
            mapper.identity::<Misdeclared>().unwrap_err().kind(),
            ErrorKind::Mapping
        );
    }

    #[test]
    fn collection_name_defaults_to_type_name() {
        assert_eq!(Employee::collection_name(), "Employee");
        assert_eq!(short_type_name::<Vec<Address>>(), "Vec");
    }

    #[test]
    fn custom_separator_reaches_nested_documents() {
        let mapper = Mapper::new('/');
        let doc = mapper.write(&employee()).unwrap();
        assert_eq!(doc.separator(), '/');
        assert_eq!(doc.get_text("address/street"), Some("1 Loop Rd"));
        let back: Employee = mapper.read(&doc).unwrap();
        assert_eq!(back.address.street, "1 Loop Rd");
    }
}
