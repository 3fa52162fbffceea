use crate::typed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value is the tagged dynamic form records travel in: scalars, ordered
/// lists, keyed maps, and nested records, walked against a [`crate::Node`]
/// tree by the shredder and reassembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    List(Vec<Value>),
    /// Keyed map with scalar keys. Entries are kept sorted by the typed
    /// rendering of their key so that structurally-equal maps compare equal.
    Map(Vec<(Value, Value)>),
    Record(Record),
}

/// Record is a dynamic struct instance: a type name plus named field values.
/// A declared attribute absent from `fields` reads as unset (stored as SQL
/// NULL), which is distinct from being present with its zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl Value {
    pub fn record(record: Record) -> Self {
        Value::Record(record)
    }

    /// Build a keyed map, sorting entries by their typed key rendering.
    pub fn map_of(mut entries: Vec<(Value, Value)>) -> Self {
        entries.sort_by_key(|(k, _)| typed::to_typed_string(k));
        Value::Map(entries)
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// The zero of a value is its type's default: empty string, 0, 0.0,
    /// false, an empty list/map, or a record whose fields are all zero.
    /// PATCH actions skip zero-valued attributes so existing columns
    /// survive the update.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::I32(n) => *n == 0,
            Value::I64(n) => *n == 0,
            Value::F32(f) => *f == 0.0,
            Value::F64(f) => *f == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Record(r) => r.fields.values().all(Value::is_zero),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "int32",
            Value::I64(_) => "int64",
            Value::F32(_) => "float32",
            Value::F64(_) => "float64",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Plain, prefix-less rendering used for primary-key rec-keys and
    /// by-example query literals.
    pub fn plain_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::I32(n) => n.to_string(),
            Value::I64(n) => n.to_string(),
            Value::F32(f) => f.to_string(),
            Value::F64(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            other => typed::to_typed_string(other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_values() {
        assert!(Value::Str(String::new()).is_zero());
        assert!(Value::I32(0).is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::List(vec![]).is_zero());
        assert!(!Value::Str("x".to_string()).is_zero());
        assert!(!Value::I32(-1).is_zero());

        let zero_rec = Record::new("T").set("A", Value::I32(0));
        assert!(Value::Record(zero_rec).is_zero());
        let rec = Record::new("T").set("A", Value::I32(7));
        assert!(!Value::Record(rec).is_zero());
    }

    #[test]
    fn map_entries_are_sorted_by_key() {
        let a = Value::map_of(vec![
            (Value::str("b"), Value::I32(2)),
            (Value::str("a"), Value::I32(1)),
        ]);
        let b = Value::map_of(vec![
            (Value::str("a"), Value::I32(1)),
            (Value::str("b"), Value::I32(2)),
        ]);
        assert_eq!(a, b);
    }
}
