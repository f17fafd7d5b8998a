//! Document predicates.
//!
//! A [`Filter`] is a plain value describing a condition on a [`Document`].
//! Collections evaluate it against every candidate during `find`, `remove`
//! and `update_where`; index-backed evaluation is left to a query layer.
//!
//! ```rust
//! use tessera_core::filter::field;
//! use tessera_core::Document;
//!
//! let filter = field("age").gte(18).and(field("address.city").eq("Oslo"));
//!
//! let mut doc = Document::new();
//! doc.put("age", 30).unwrap();
//! doc.put("address.city", "Oslo").unwrap();
//! assert!(filter.matches(&doc));
//! ```

use crate::document::Document;
use std::cmp::Ordering;
use std::ops::Bound;
use tessera_codec::Value;

/// A condition on a document.
///
/// Field operands are paths resolved with the document's separator. A
/// missing field reads as null for equality tests and fails every ordering
/// test. Integers and floats compare numerically.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals the value.
    Eq {
        /// Field path.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field does not equal the value.
    Ne {
        /// Field path.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field is greater than the value.
    Gt {
        /// Field path.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field is greater than or equal to the value.
    Gte {
        /// Field path.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field is less than the value.
    Lt {
        /// Field path.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field is less than or equal to the value.
    Lte {
        /// Field path.
        field: String,
        /// Operand.
        value: Value,
    },
    /// Field lies within a range.
    Between {
        /// Field path.
        field: String,
        /// Lower end of the range.
        lower: Bound<Value>,
        /// Upper end of the range.
        upper: Bound<Value>,
    },
    /// Field equals one of the values.
    In {
        /// Field path.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Field is present, whatever its value.
    Exists {
        /// Field path.
        field: String,
    },
    /// Negation.
    Not(Box<Filter>),
    /// Every filter matches; an empty list always matches.
    And(Vec<Filter>),
    /// At least one filter matches; an empty list never matches.
    Or(Vec<Filter>),
}

impl Filter {
    /// Evaluates this filter against `doc`.
    ///
    /// `And` and `Or` evaluate their parts left to right and stop at the
    /// first decisive one.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => equals(doc.get(field), value),
            Filter::Ne { field, value } => !equals(doc.get(field), value),
            Filter::Gt { field, value } => ordered(doc.get(field), value, Ordering::is_gt),
            Filter::Gte { field, value } => ordered(doc.get(field), value, Ordering::is_ge),
            Filter::Lt { field, value } => ordered(doc.get(field), value, Ordering::is_lt),
            Filter::Lte { field, value } => ordered(doc.get(field), value, Ordering::is_le),
            Filter::Between {
                field,
                lower,
                upper,
            } => {
                let Some(actual) = doc.get(field) else {
                    return false;
                };
                let above = match lower {
                    Bound::Included(v) => ordered(Some(actual), v, Ordering::is_ge),
                    Bound::Excluded(v) => ordered(Some(actual), v, Ordering::is_gt),
                    Bound::Unbounded => true,
                };
                above
                    && match upper {
                        Bound::Included(v) => ordered(Some(actual), v, Ordering::is_le),
                        Bound::Excluded(v) => ordered(Some(actual), v, Ordering::is_lt),
                        Bound::Unbounded => true,
                    }
            }
            Filter::In { field, values } => {
                let actual = doc.get(field);
                values.iter().any(|v| equals(actual, v))
            }
            Filter::Exists { field } => doc.contains_key(field),
            Filter::Not(inner) => !inner.matches(doc),
            Filter::And(parts) => parts.iter().all(|f| f.matches(doc)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(doc)),
        }
    }

    /// Returns whether this is [`Filter::All`].
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    /// Combines with `other`; both must match.
    #[must_use]
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Combines with `other`; either may match.
    #[must_use]
    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    actual.unwrap_or(&Value::Null).loosely_equals(expected)
}

fn ordered(actual: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|v| v.compare(operand))
        .is_some_and(accept)
}

/// Starts a filter on the field at `path`.
#[must_use]
pub fn field(path: impl Into<String>) -> FieldFilter {
    FieldFilter { path: path.into() }
}

/// Builder for filters on one field, created by [`field`].
#[derive(Debug, Clone)]
pub struct FieldFilter {
    path: String,
}

impl FieldFilter {
    /// Field equals `value`.
    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Filter {
        Filter::Eq {
            field: self.path,
            value: value.into(),
        }
    }

    /// Field does not equal `value`.
    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Filter {
        Filter::Ne {
            field: self.path,
            value: value.into(),
        }
    }

    /// Field is greater than `value`.
    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Filter {
        Filter::Gt {
            field: self.path,
            value: value.into(),
        }
    }

    /// Field is at least `value`.
    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Filter {
        Filter::Gte {
            field: self.path,
            value: value.into(),
        }
    }

    /// Field is less than `value`.
    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Filter {
        Filter::Lt {
            field: self.path,
            value: value.into(),
        }
    }

    /// Field is at most `value`.
    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Filter {
        Filter::Lte {
            field: self.path,
            value: value.into(),
        }
    }

    /// Field lies in `[lower, upper]`.
    #[must_use]
    pub fn between(self, lower: impl Into<Value>, upper: impl Into<Value>) -> Filter {
        self.between_bounds(Bound::Included(lower.into()), Bound::Included(upper.into()))
    }

    /// Field lies between two arbitrary bounds.
    #[must_use]
    pub fn between_bounds(self, lower: Bound<Value>, upper: Bound<Value>) -> Filter {
        Filter::Between {
            field: self.path,
            lower,
            upper,
        }
    }

    /// Field equals one of `values`.
    #[must_use]
    pub fn is_in<I, V>(self, values: I) -> Filter
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            field: self.path,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Field is present.
    #[must_use]
    pub fn exists(self) -> Filter {
        Filter::Exists { field: self.path }
    }
}
