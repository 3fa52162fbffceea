//! Typed string forms: the `kind:rendering` encoding used wherever a value
//! must live inside a string — map keys inside rec-keys, and slice/map
//! attributes of scalar elements stored in a single text column.

use crate::{CodecError, Value};

/// Render a value with its type tag prefix.
pub fn to_typed_string(value: &Value) -> String {
    match value {
        Value::Null => "null:".to_string(),
        Value::Bool(b) => format!("bool:{b}"),
        Value::I32(n) => format!("int32:{n}"),
        Value::I64(n) => format!("int64:{n}"),
        Value::F32(f) => format!("float32:{f}"),
        Value::F64(f) => format!("float64:{f}"),
        Value::Str(s) => format!("string:{s}"),
        list @ Value::List(_) => format!(
            "list:{}",
            serde_json::to_string(list).expect("list rendering cannot fail")
        ),
        map @ Value::Map(_) => format!(
            "map:{}",
            serde_json::to_string(map).expect("map rendering cannot fail")
        ),
        record @ Value::Record(_) => format!(
            "record:{}",
            serde_json::to_string(record).expect("record rendering cannot fail")
        ),
    }
}

/// Parse a typed string back to its value. The prefix is authoritative;
/// callers holding a declared kind verify it against the result.
pub fn parse_typed_string(s: &str) -> Result<Value, CodecError> {
    let (tag, rest) = s
        .split_once(':')
        .ok_or_else(|| CodecError::TypedString(s.to_string()))?;
    let malformed = || CodecError::TypedString(s.to_string());
    match tag {
        "null" => Ok(Value::Null),
        "bool" => rest.parse().map(Value::Bool).map_err(|_| malformed()),
        "int32" => rest.parse().map(Value::I32).map_err(|_| malformed()),
        "int64" => rest.parse().map(Value::I64).map_err(|_| malformed()),
        "float32" => rest.parse().map(Value::F32).map_err(|_| malformed()),
        "float64" => rest.parse().map(Value::F64).map_err(|_| malformed()),
        "string" => Ok(Value::Str(rest.to_string())),
        "list" | "map" | "record" => serde_json::from_str(rest).map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}
