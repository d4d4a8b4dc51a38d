//! Records, record ids and store queries

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};

/// Ordered attribute map
pub type Attrs = Map<String, Value>;

/// A stored row: attributes plus the reserved `id` key
pub type Record = Attrs;

/// Record identifier, always normalized to its string form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create an id from its string form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Normalize a JSON value into an id. Strings and numbers qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// The id of a record, if it carries one
    pub fn of(record: &Record) -> Option<Self> {
        record.get("id").and_then(Self::from_value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, for ids issued by a counter
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&String> for RecordId {
    fn from(id: &String) -> Self {
        Self(id.clone())
    }
}

impl From<&RecordId> for RecordId {
    fn from(id: &RecordId) -> Self {
        id.clone()
    }
}

macro_rules! record_id_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for RecordId {
                fn from(id: $ty) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

record_id_from_integer!(i32, i64, u32, u64, usize);

/// Conversion into an attribute map for store and model operations
pub trait IntoAttrs {
    fn into_attrs(self) -> ModelResult<Attrs>;
}

impl IntoAttrs for Attrs {
    fn into_attrs(self) -> ModelResult<Attrs> {
        Ok(self)
    }
}

impl IntoAttrs for &Attrs {
    fn into_attrs(self) -> ModelResult<Attrs> {
        Ok(self.clone())
    }
}

impl IntoAttrs for Value {
    fn into_attrs(self) -> ModelResult<Attrs> {
        match self {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Attrs::new()),
            other => Err(ModelError::Serialization(format!(
                "expected an attribute object, got {}",
                other
            ))),
        }
    }
}

impl IntoAttrs for () {
    fn into_attrs(self) -> ModelResult<Attrs> {
        Ok(Attrs::new())
    }
}

/// Selects records in a collection
#[derive(Clone)]
pub enum Query {
    /// Every record
    All,
    /// The record with this id
    Id(RecordId),
    /// Records whose attributes equal every given key
    Attrs(Attrs),
    /// Records accepted by the predicate
    Predicate(Rc<dyn Fn(&Record) -> bool>),
}

impl Query {
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + 'static,
    {
        Query::Predicate(Rc::new(predicate))
    }

    pub fn id(id: impl Into<RecordId>) -> Self {
        Query::Id(id.into())
    }

    /// Test a record against this query
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Query::All => true,
            Query::Id(id) => RecordId::of(record).as_ref() == Some(id),
            Query::Attrs(attrs) => attrs.iter().all(|(key, expected)| {
                let actual = record.get(key).unwrap_or(&Value::Null);
                values_match(actual, expected)
            }),
            Query::Predicate(predicate) => predicate(record),
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::All => f.write_str("All"),
            Query::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Query::Attrs(attrs) => f.debug_tuple("Attrs").field(attrs).finish(),
            Query::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<Attrs> for Query {
    fn from(attrs: Attrs) -> Self {
        Query::Attrs(attrs)
    }
}

/// Objects match by attributes, `null` matches everything, scalars are ids
impl From<Value> for Query {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(attrs) => Query::Attrs(attrs),
            Value::Null => Query::All,
            other => match RecordId::from_value(&other) {
                Some(id) => Query::Id(id),
                None => Query::predicate(|_| false),
            },
        }
    }
}

impl From<RecordId> for Query {
    fn from(id: RecordId) -> Self {
        Query::Id(id)
    }
}

impl From<&RecordId> for Query {
    fn from(id: &RecordId) -> Self {
        Query::Id(id.clone())
    }
}

impl From<&str> for Query {
    fn from(id: &str) -> Self {
        Query::Id(id.into())
    }
}

macro_rules! query_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Query {
                fn from(id: $ty) -> Self {
                    Query::Id(id.into())
                }
            }
        )*
    };
}

query_from_integer!(i32, i64, u32, u64, usize);

/// Attribute equality with id normalization: `1` matches `"1"`
pub fn values_match(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (RecordId::from_value(actual), RecordId::from_value(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
