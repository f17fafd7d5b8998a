//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data that stays within
//! what the store accepts: finite floats, text keys and valid names.

use crate::records::{Address, Employee};
use bytes::Bytes;
use proptest::prelude::*;
use tessera_core::{Document, Frozen, Value};

/// Strategy for collection names the store accepts.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for top-level field names, free of the `.` separator.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        "[ -~]{0,24}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

/// Strategy for values nested up to three levels, maps keyed by text.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec((field_name_strategy(), inner), 0..6)
                .prop_map(|fields| {
                    Value::Map(
                        dedup(fields)
                            .into_iter()
                            .map(|(name, value)| (Value::Text(name), value))
                            .collect(),
                    )
                }),
        ]
    })
}

/// Strategy for documents with unique top-level field names.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec((field_name_strategy(), value_strategy()), 0..8)
        .prop_map(|fields| Document::from_fields(dedup(fields)))
}

/// Keeps the first occurrence of every name.
fn dedup(fields: Vec<(String, Value)>) -> Vec<(String, Value)> {
    let mut seen = std::collections::HashSet::new();
    fields
        .into_iter()
        .filter(|(name, _)| seen.insert(name.clone()))
        .collect()
}

/// Strategy for addresses.
pub fn address_strategy() -> impl Strategy<Value = Address> {
    ("[ -~]{0,40}", "[A-Za-z ]{1,20}", prop::option::of(any::<u32>())).prop_map(
        |(street, city, zip)| Address { street, city, zip },
    )
}

/// Strategy for employees with identities in `ids`.
pub fn employee_strategy(ids: std::ops::Range<i64>) -> impl Strategy<Value = Employee> {
    (
        ids,
        "[ -~]{0,40}",
        any::<i64>(),
        address_strategy(),
        -1.0e9f64..1.0e9,
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec("[a-z]{1,10}", 0..5),
        prop::option::of(any::<i64>()),
    )
        .prop_map(
            |(emp_id, name, join_date, address, salary, photo, skills, manager)| Employee {
                emp_id: Frozen::new(emp_id),
                name,
                join_date,
                address,
                salary,
                photo: Bytes::from(photo),
                skills,
                manager,
            },
        )
}

/// An operation on a collection of numbered documents.
#[derive(Debug, Clone)]
pub enum DocumentOperation {
    /// Insert or replace the document with this identity.
    Put {
        /// Identity.
        id: i64,
        /// Payload stored in the `value` field.
        value: i64,
    },
    /// Remove the document with this identity.
    Remove {
        /// Identity.
        id: i64,
    },
    /// Make everything so far durable.
    Commit,
}

/// Strategy for a sequence of operations over a small identity space, so
/// that puts and removes collide.
pub fn operation_sequence_strategy(len: usize) -> impl Strategy<Value = Vec<DocumentOperation>> {
    let op = prop_oneof![
        6 => (0i64..32, any::<i64>()).prop_map(|(id, value)| DocumentOperation::Put { id, value }),
        3 => (0i64..32).prop_map(|id| DocumentOperation::Remove { id }),
        1 => Just(DocumentOperation::Commit),
    ];
    prop::collection::vec(op, 0..len)
}
