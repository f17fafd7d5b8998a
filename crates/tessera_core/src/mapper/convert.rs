//! Conversions between record field types and document values.

use crate::document::{Document, DocumentId, DEFAULT_SEPARATOR};
use bytes::Bytes;
use tessera_codec::Value;

/// A field type the mapper can store in a document.
///
/// `from_value` returns `None` when the stored value has the wrong type or
/// does not fit, e.g. `300` read back as a `u8`.
pub trait FieldValue: Sized {
    /// Name of the expected value type, used in mapping errors.
    const EXPECTED: &'static str;

    /// Converts the field to a document value.
    fn to_value(&self) -> Value;

    /// Converts a stored value back, if it fits.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FieldValue for bool {
    const EXPECTED: &'static str = "bool";

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

macro_rules! integer_field {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                const EXPECTED: &'static str = concat!("integer within ", stringify!($ty));

                fn to_value(&self) -> Value {
                    Value::Integer(i64::from(*self))
                }

                fn from_value(value: &Value) -> Option<Self> {
                    value.as_integer().and_then(|n| <$ty>::try_from(n).ok())
                }
            }
        )*
    };
}

integer_field!(i8, i16, i32, i64, u8, u16, u32);

impl FieldValue for f64 {
    const EXPECTED: &'static str = "number";

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }
}

impl FieldValue for f32 {
    const EXPECTED: &'static str = "number";

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Option<Self> {
        value.as_float().map(|f| f as f32)
    }
}

impl FieldValue for String {
    const EXPECTED: &'static str = "text";

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FieldValue for Bytes {
    const EXPECTED: &'static str = "bytes";

    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(Bytes::copy_from_slice)
    }
}

impl FieldValue for DocumentId {
    const EXPECTED: &'static str = "document id text";

    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        DocumentId::from_value(value)
    }
}

impl FieldValue for Document {
    const EXPECTED: &'static str = "document";

    fn to_value(&self) -> Value {
        Document::to_value(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Map(_) => Document::from_value(value.clone(), DEFAULT_SEPARATOR).ok(),
            _ => None,
        }
    }
}

impl FieldValue for Value {
    const EXPECTED: &'static str = "any value";

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    const EXPECTED: &'static str = "array";

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(T::to_value).collect())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_array()?.iter().map(T::from_value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(u8::from_value(&Value::Integer(255)), Some(255));
        assert_eq!(u8::from_value(&Value::Integer(256)), None);
        assert_eq!(u32::from_value(&Value::Integer(-1)), None);
        assert_eq!(i16::from_value(&Value::Float(1.0)), None);
        assert_eq!(42i32.to_value(), Value::Integer(42));
    }

    #[test]
    fn floats_accept_integers() {
        assert_eq!(f64::from_value(&Value::Integer(3)), Some(3.0));
        assert_eq!(f32::from_value(&Value::Float(0.5)), Some(0.5));
    }

    #[test]
    fn options_map_null() {
        assert_eq!(Option::<String>::from_value(&Value::Null), Some(None));
        assert_eq!(Some(7i64).to_value(), Value::Integer(7));
        assert_eq!(None::<i64>.to_value(), Value::Null);
        assert_eq!(Option::<i64>::from_value(&Value::from("x")), None);
    }

    #[test]
    fn arrays_fail_as_a_whole() {
        let good = Value::Array(vec![Value::from("a"), Value::from("b")]);
        let bad = Value::Array(vec![Value::from("a"), Value::Integer(1)]);
        assert_eq!(
            Vec::<String>::from_value(&good),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(Vec::<String>::from_value(&bad), None);
    }

    #[test]
    fn binary_and_documents() {
        let bytes = Bytes::from_static(b"\x00\x01");
        assert_eq!(Bytes::from_value(&bytes.to_value()), Some(bytes));

        let mut doc = Document::new();
        doc.put("a.b", 1).unwrap();
        let stored = FieldValue::to_value(&doc);
        assert_eq!(<Document as FieldValue>::from_value(&stored), Some(doc));
        assert_eq!(<Document as FieldValue>::from_value(&Value::Integer(1)), None);
    }
}
