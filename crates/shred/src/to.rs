use crate::{Action, Bundle, Row, ShredError, Table};
use schema::{typed, Node, Record, Resources, Value};
use std::collections::BTreeMap;

/// Shred one or more root records into their relational bundle. `keys`
/// optionally provides a caller key per element for key-less roots; the
/// positional fallback is the empty local key.
pub fn shred(
    action: Action,
    elements: &[Value],
    keys: &[Value],
    res: &Resources,
) -> Result<Bundle, ShredError> {
    let first = elements.first().ok_or(ShredError::Empty)?;
    let root = first
        .as_record()
        .ok_or_else(|| ShredError::NotARecord(first.kind_name()))?;
    let node = res.registry.node(&root.type_name)?;
    let mut bundle = Bundle::new(&root.type_name);

    if elements.len() == 1 {
        emit(action, root, "", "", &node, &mut bundle, res)?;
        return Ok(bundle);
    }

    for (i, element) in elements.iter().enumerate() {
        let record = element
            .as_record()
            .ok_or_else(|| ShredError::NotARecord(element.kind_name()))?;
        let key = keys.get(i).map(Value::plain_string).unwrap_or_default();
        emit(action, record, "", &key, &node, &mut bundle, res)?;
    }
    Ok(bundle)
}

fn emit(
    action: Action,
    record: &Record,
    parent_key: &str,
    local_key: &str,
    node: &Node,
    bundle: &mut Bundle,
    res: &Resources,
) -> Result<(), ShredError> {
    let columns = {
        let table = bundle
            .tables
            .entry(node.type_name.clone())
            .or_insert_with(|| Table::new(&node.type_name));
        table.set_columns(node);
        table.columns.clone()
    };

    let mut row = Row {
        parent_key: parent_key.to_string(),
        rec_key: rec_key(node, record, local_key, res),
        column_values: BTreeMap::new(),
    };

    for (name, _) in node.column_attributes() {
        // An attribute absent from the record stays unset and lands as SQL
        // NULL; under PATCH a zero value is equally skipped so COALESCE
        // preserves the existing column.
        let Some(value) = record.get(name) else {
            continue;
        };
        if action == Action::Patch && value.is_zero() {
            continue;
        }
        let col = columns[name];
        row.column_values.insert(col, res.codec.encode(value)?);
    }

    let child_parent = format!("{}{}", row.parent_key, row.rec_key);
    for (name, attr) in node.struct_attributes() {
        match (record.get(name), attr.is_map, attr.is_slice) {
            (Some(Value::Map(entries)), true, _) => {
                for (key, value) in entries {
                    let Some(child) = value.as_record() else {
                        continue;
                    };
                    let local = typed::to_typed_string(key);
                    emit(action, child, &child_parent, &local, attr, bundle, res)?;
                }
            }
            (Some(Value::List(items)), _, true) => {
                for (i, item) in items.iter().enumerate() {
                    let Some(child) = item.as_record() else {
                        continue;
                    };
                    emit(action, child, &child_parent, &i.to_string(), attr, bundle, res)?;
                }
            }
            (Some(Value::Record(child)), false, false) => {
                emit(action, child, &child_parent, "", attr, bundle, res)?;
            }
            _ => {}
        }
    }

    bundle
        .rows_mut(&node.type_name, parent_key, &node.field_name)
        .rows
        .push(row);
    Ok(())
}

/// The rec-key of an instance: `field[local]`, where local is the primary
/// key value when the type carries a primary-key decorator and the caller's
/// local key otherwise. Keys containing `[` or `]` are not escaped and can
/// collide with this encoding; that is a known limitation.
fn rec_key(node: &Node, record: &Record, local_key: &str, res: &Resources) -> String {
    let local = res
        .registry
        .primary_key_value(record)
        .unwrap_or_else(|| local_key.to_string());
    format!("{}[{}]", node.field_name, local)
}
