use crate::ShredError;
use query::Query;
use schema::{Node, Resources};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bundle is the transient relational form of a value: per-type tables of
/// rows keyed by (parent-key, rec-key). It is produced by the shredder or
/// the executor and consumed immediately by the executor or the
/// reassembler; the serde form doubles as its wire encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub root_type: String,
    pub tables: BTreeMap<String, Table>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Attribute name to 1-based column index.
    pub columns: BTreeMap<String, i32>,
    /// Parent key to the instance rows filed beneath it.
    pub instance_rows: BTreeMap<String, InstanceRows>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceRows {
    /// Field name (in the parent type) to its rows.
    pub attribute_rows: BTreeMap<String, AttributeRows>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeRows {
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub parent_key: String,
    pub rec_key: String,
    /// Column index to the codec payload of the attribute value.
    pub column_values: BTreeMap<i32, Vec<u8>>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Table {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Populate the column map on first touch: every scalar attribute of
    /// the node gets a sequential 1-based index; struct attributes live in
    /// their own tables and never occupy columns.
    pub fn set_columns(&mut self, node: &Node) {
        if !self.columns.is_empty() {
            return;
        }
        for (name, _) in node.column_attributes() {
            self.add_column(name);
        }
    }

    pub fn add_column(&mut self, name: &str) {
        if !self.columns.contains_key(name) {
            let index = self.columns.len() as i32 + 1;
            self.columns.insert(name.to_string(), index);
        }
    }
}

impl Bundle {
    pub fn new(root_type: &str) -> Self {
        Bundle {
            root_type: root_type.to_string(),
            ..Default::default()
        }
    }

    /// The rows slot for (type, parent-key, field-name), created on demand.
    pub fn rows_mut(
        &mut self,
        type_name: &str,
        parent_key: &str,
        field_name: &str,
    ) -> &mut AttributeRows {
        self.tables
            .entry(type_name.to_string())
            .or_insert_with(|| Table::new(type_name))
            .instance_rows
            .entry(parent_key.to_string())
            .or_default()
            .attribute_rows
            .entry(field_name.to_string())
            .or_default()
    }

    /// File a row read back from the database under the field name encoded
    /// in its rec-key.
    pub fn file_row(&mut self, type_name: &str, row: Row) {
        let field = name_of_field(&row.rec_key).to_string();
        let parent_key = row.parent_key.clone();
        self.rows_mut(type_name, &parent_key, &field).rows.push(row);
    }

    /// The empty bundle a query reads into: tables for the root type's
    /// closure, either fully columned or restricted to the query's
    /// projection.
    pub fn for_query(query: &Query, res: &Resources) -> Result<Bundle, ShredError> {
        let root = res.registry.node(query.root_type())?;
        let mut bundle = Bundle::new(&root.type_name);

        if query.properties().is_empty() {
            add_table(&root, &mut bundle);
            return Ok(bundle);
        }

        // Projection: tables exist only along property paths, each holding
        // only the projected columns.
        bundle
            .tables
            .insert(root.type_name.clone(), Table::new(&root.type_name));
        for property in query.properties() {
            let mut node: &Node = &root;
            for (i, segment) in property.path.iter().enumerate() {
                let attr = node.attributes.get(segment).ok_or_else(|| {
                    ShredError::ProjectedStruct {
                        type_name: node.type_name.clone(),
                        attr: segment.clone(),
                    }
                })?;
                if i + 1 < property.path.len() {
                    bundle
                        .tables
                        .entry(attr.type_name.clone())
                        .or_insert_with(|| Table::new(&attr.type_name));
                    node = attr;
                } else {
                    if attr.is_struct {
                        return Err(ShredError::ProjectedStruct {
                            type_name: node.type_name.clone(),
                            attr: segment.clone(),
                        });
                    }
                    bundle
                        .tables
                        .entry(node.type_name.clone())
                        .or_insert_with(|| Table::new(&node.type_name))
                        .add_column(segment);
                }
            }
        }
        Ok(bundle)
    }
}

fn add_table(node: &Node, bundle: &mut Bundle) {
    if bundle.tables.contains_key(&node.type_name) {
        return;
    }
    let mut table = Table::new(&node.type_name);
    table.set_columns(node);
    bundle.tables.insert(node.type_name.clone(), table);
    for (_, attr) in node.struct_attributes() {
        add_table(attr, bundle);
    }
}

/// The field-name prefix of a rec-key: `Hosts[h1]` filed under `Hosts`,
/// a root key `[x]` under the empty field name.
pub fn name_of_field(rec_key: &str) -> &str {
    match rec_key.find('[') {
        Some(index) => &rec_key[..index],
        None => rec_key,
    }
}
