use crate::{Bundle, Meta, QueryResult, ShredError};
use schema::{typed, Kind, Node, Record, Resources, Value};
use std::collections::BTreeMap;

enum Assembled {
    /// Instances keyed by rec-key; the caller picks elements or, for a
    /// single-struct attribute, pulls the sole value out.
    Keyed(BTreeMap<String, Value>),
    /// A finished slice or map value.
    One(Value),
}

/// Reassemble the root records of a bundle, wrapping them with the read
/// metadata (total counts) when present.
pub fn reassemble(
    bundle: &Bundle,
    metadata: Option<Meta>,
    res: &Resources,
) -> Result<QueryResult, ShredError> {
    let node = res.registry.node(&bundle.root_type)?;
    let elements = match assemble(&node, "", bundle, res)? {
        Some(Assembled::Keyed(keyed)) => keyed.into_values().collect(),
        Some(Assembled::One(value)) => vec![value],
        None => Vec::new(),
    };
    Ok(QueryResult { elements, metadata })
}

fn assemble(
    node: &Node,
    parent_key: &str,
    bundle: &Bundle,
    res: &Resources,
) -> Result<Option<Assembled>, ShredError> {
    // No data for this attribute.
    let Some(table) = bundle.tables.get(&node.type_name) else {
        return Ok(None);
    };
    let Some(instance) = table.instance_rows.get(parent_key) else {
        return Ok(None);
    };
    let Some(attr_rows) = instance.attribute_rows.get(&node.field_name) else {
        return Ok(None);
    };

    let mut keyed = BTreeMap::new();
    for row in &attr_rows.rows {
        let mut record = Record::new(&node.type_name);

        for (name, attr) in node.column_attributes() {
            let Some(col) = table.columns.get(name) else {
                continue;
            };
            let Some(data) = row.column_values.get(col) else {
                continue;
            };
            if data.is_empty() {
                continue;
            }
            let value = res.codec.decode(data)?;
            if let Some(value) = coerce(value, attr) {
                record.fields.insert(name.clone(), value);
            }
        }

        let child_parent = format!("{}{}", row.parent_key, row.rec_key);
        for (name, attr) in node.struct_attributes() {
            match assemble(attr, &child_parent, bundle, res)? {
                Some(Assembled::One(value)) => {
                    record.fields.insert(name.clone(), value);
                }
                Some(Assembled::Keyed(instances)) => {
                    // A single-struct attribute assembles to a one-entry
                    // keyed map; pull the sole instance out.
                    if let Some((_, value)) = instances.into_iter().next() {
                        record.fields.insert(name.clone(), value);
                    }
                }
                None => {}
            }
        }

        keyed.insert(row.rec_key.clone(), Value::Record(record));
    }

    if node.is_slice {
        return Ok(Some(Assembled::One(to_slice(keyed, node)?)));
    }
    if node.is_map {
        return Ok(Some(Assembled::One(to_map(keyed)?)));
    }
    Ok(Some(Assembled::Keyed(keyed)))
}

// Decoded scalar columns are matched against the declared attribute kind:
// equal kinds set directly, integer widths widen/narrow across 32/64 bits,
// an empty string on a non-string field is ignored, anything else is
// dropped. Scalar-element slices and maps arrive as whole list/map values.
fn coerce(value: Value, attr: &Node) -> Option<Value> {
    if attr.is_slice || attr.is_map {
        return match value {
            v @ (Value::List(_) | Value::Map(_)) => Some(v),
            _ => None,
        };
    }
    match (attr.kind(), value) {
        (Kind::Str, Value::Str(s)) => Some(Value::Str(s)),
        (_, Value::Str(s)) if s.is_empty() => None,
        (Kind::I32 | Kind::Enum, Value::I32(n)) => Some(Value::I32(n)),
        (Kind::I32 | Kind::Enum, Value::I64(n)) => Some(Value::I32(n as i32)),
        (Kind::I64, Value::I64(n)) => Some(Value::I64(n)),
        (Kind::I64, Value::I32(n)) => Some(Value::I64(n as i64)),
        (Kind::F32, Value::F32(f)) => Some(Value::F32(f)),
        (Kind::F32, Value::F64(f)) => Some(Value::F32(f as f32)),
        (Kind::F64, Value::F64(f)) => Some(Value::F64(f)),
        (Kind::F64, Value::F32(f)) => Some(Value::F64(f as f64)),
        (Kind::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
        _ => None,
    }
}

fn to_slice(keyed: BTreeMap<String, Value>, node: &Node) -> Result<Value, ShredError> {
    let len = keyed.len();
    let mut items = vec![Value::Null; len];
    for (rec_key, value) in keyed {
        let local = local_key(&rec_key)?;
        let index: usize = local
            .parse()
            .map_err(|_| ShredError::RecKey(rec_key.clone()))?;
        if index >= len {
            return Err(ShredError::SliceIndex {
                type_name: node.type_name.clone(),
                index,
                len,
            });
        }
        items[index] = value;
    }
    Ok(Value::List(items))
}

fn to_map(keyed: BTreeMap<String, Value>) -> Result<Value, ShredError> {
    let mut entries = Vec::with_capacity(keyed.len());
    for (rec_key, value) in keyed {
        let local = local_key(&rec_key)?;
        let key = typed::parse_typed_string(local)?;
        entries.push((key, value));
    }
    Ok(Value::map_of(entries))
}

/// The bracketed local key of a rec-key: index for slices, typed map key
/// for maps.
fn local_key(rec_key: &str) -> Result<&str, ShredError> {
    let open = rec_key.rfind('[');
    let close = rec_key.rfind(']');
    match (open, close) {
        (Some(open), Some(close)) if open < close => Ok(&rec_key[open + 1..close]),
        _ => Err(ShredError::RecKey(rec_key.to_string())),
    }
}
