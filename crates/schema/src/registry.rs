use crate::{Node, Record};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("unknown attribute {attr:?} of type {type_name:?}")]
    UnknownAttribute { type_name: String, attr: String },
    #[error("type {0:?} participates in a cyclic type graph")]
    CyclicType(String),
    #[error("type {0:?} is already registered")]
    Duplicate(String),
}

/// FieldDef describes one attribute of a registered type. The attribute is
/// struct-typed exactly when `type_name` resolves to another registered
/// type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
    pub is_slice: bool,
    pub is_map: bool,
    /// Scalar type name of map keys; empty unless `is_map`.
    pub key_type: String,
}

/// TypeDef is the registration unit: a struct type name and its fields.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// A single-valued field, scalar or struct depending on `type_name`.
    pub fn field(mut self, name: &str, type_name: &str) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_slice: false,
            is_map: false,
            key_type: String::new(),
        });
        self
    }

    pub fn slice(mut self, name: &str, element_type: &str) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            type_name: element_type.to_string(),
            is_slice: true,
            is_map: false,
            key_type: String::new(),
        });
        self
    }

    pub fn map(mut self, name: &str, key_type: &str, element_type: &str) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            type_name: element_type.to_string(),
            is_slice: false,
            is_map: true,
            key_type: key_type.to_string(),
        });
        self
    }
}

/// Decorator carries the externally-declared key metadata of one type:
/// primary-key fields, unique-key fields, and non-unique indexed fields.
#[derive(Debug, Clone, Default)]
pub struct Decorator {
    pub primary: Vec<String>,
    pub unique: Vec<String>,
    pub non_unique: Vec<String>,
}

#[derive(Default)]
struct Inner {
    types: HashMap<String, TypeDef>,
    nodes: HashMap<String, Arc<Node>>,
    decorators: HashMap<String, Decorator>,
    // Lowercase lookup tables, built at registration so text queries can
    // resolve names case-insensitively without a process-wide cache.
    lower_types: HashMap<String, String>,
    lower_attrs: HashMap<String, HashMap<String, String>>,
}

/// TypeRegistry is the type-metadata facade: registered type definitions,
/// the node trees derived from them, and the key decorators. One registry
/// is shared (via `Arc`) by every component of a service area.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<Inner>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, def: TypeDef) -> Result<(), SchemaError> {
        let mut inner = self.inner.write().unwrap();
        if inner.types.contains_key(&def.name) {
            return Err(SchemaError::Duplicate(def.name));
        }
        inner
            .lower_types
            .insert(def.name.to_lowercase(), def.name.clone());
        let attrs = def
            .fields
            .iter()
            .map(|f| (f.name.to_lowercase(), f.name.clone()))
            .collect();
        inner.lower_attrs.insert(def.name.clone(), attrs);
        // Derived node trees are invalidated; they are rebuilt on demand.
        inner.nodes.clear();
        inner.types.insert(def.name.clone(), def);
        Ok(())
    }

    /// The node tree rooted at `type_name`, built on first use and cached.
    /// Cyclic type graphs are rejected: the shredder walks structure, not
    /// identity, so the graph must be a tree.
    pub fn node(&self, type_name: &str) -> Result<Arc<Node>, SchemaError> {
        if let Some(node) = self.inner.read().unwrap().nodes.get(type_name) {
            return Ok(node.clone());
        }
        let inner = self.inner.read().unwrap();
        let def = inner
            .types
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))?;
        let mut path = HashSet::new();
        let node = Arc::new(build_node(&inner, def, "", "", "", &mut path)?);
        drop(inner);
        self.inner
            .write()
            .unwrap()
            .nodes
            .insert(type_name.to_string(), node.clone());
        Ok(node)
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.inner.read().unwrap().types.contains_key(type_name)
    }

    /// Resolve a type name case-insensitively to its registered form.
    pub fn resolve_type(&self, name: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        if inner.types.contains_key(name) {
            return Some(name.to_string());
        }
        inner.lower_types.get(&name.to_lowercase()).cloned()
    }

    /// Resolve an attribute name of `type_name` case-insensitively.
    pub fn resolve_attr(&self, type_name: &str, attr: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        let table = inner.lower_attrs.get(type_name)?;
        if let Some(def) = inner.types.get(type_name) {
            if def.fields.iter().any(|f| f.name == attr) {
                return Some(attr.to_string());
            }
        }
        table.get(&attr.to_lowercase()).cloned()
    }

    pub fn decorate_primary(&self, type_name: &str, fields: &[&str]) {
        let mut inner = self.inner.write().unwrap();
        let d = inner.decorators.entry(type_name.to_string()).or_default();
        d.primary = fields.iter().map(|f| f.to_string()).collect();
    }

    pub fn decorate_unique(&self, type_name: &str, fields: &[&str]) {
        let mut inner = self.inner.write().unwrap();
        let d = inner.decorators.entry(type_name.to_string()).or_default();
        d.unique = fields.iter().map(|f| f.to_string()).collect();
    }

    pub fn decorate_non_unique(&self, type_name: &str, fields: &[&str]) {
        let mut inner = self.inner.write().unwrap();
        let d = inner.decorators.entry(type_name.to_string()).or_default();
        d.non_unique = fields.iter().map(|f| f.to_string()).collect();
    }

    pub fn decorator(&self, type_name: &str) -> Decorator {
        self.inner
            .read()
            .unwrap()
            .decorators
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn primary_fields(&self, type_name: &str) -> Vec<String> {
        self.decorator(type_name).primary
    }

    /// The primary-key rendering of a record, or None when its type carries
    /// no primary-key decorator. Multi-field keys join their plain values
    /// with a comma.
    pub fn primary_key_value(&self, record: &Record) -> Option<String> {
        let fields = self.primary_fields(&record.type_name);
        if fields.is_empty() {
            return None;
        }
        let parts: Vec<String> = fields
            .iter()
            .map(|f| {
                record
                    .get(f)
                    .map(|v| v.plain_string())
                    .unwrap_or_default()
            })
            .collect();
        Some(parts.join(","))
    }
}

fn build_node(
    inner: &Inner,
    def: &TypeDef,
    field_name: &str,
    parent_type: &str,
    key_type: &str,
    path: &mut HashSet<String>,
) -> Result<Node, SchemaError> {
    if !path.insert(def.name.clone()) {
        return Err(SchemaError::CyclicType(def.name.clone()));
    }

    let mut attributes = BTreeMap::new();
    for field in &def.fields {
        let attr = match inner.types.get(&field.type_name) {
            Some(child) => {
                let mut node = build_node(
                    inner,
                    child,
                    &field.name,
                    &def.name,
                    &field.key_type,
                    path,
                )?;
                node.is_slice = field.is_slice;
                node.is_map = field.is_map;
                node
            }
            None => Node {
                type_name: field.type_name.clone(),
                field_name: field.name.clone(),
                parent_type: def.name.clone(),
                key_type: field.key_type.clone(),
                is_struct: false,
                is_slice: field.is_slice,
                is_map: field.is_map,
                attributes: BTreeMap::new(),
            },
        };
        attributes.insert(field.name.clone(), attr);
    }

    path.remove(&def.name);
    Ok(Node {
        type_name: def.name.clone(),
        field_name: field_name.to_string(),
        parent_type: parent_type.to_string(),
        key_type: key_type.to_string(),
        is_struct: true,
        is_slice: false,
        is_map: false,
        attributes,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Value;

    fn registry() -> TypeRegistry {
        let reg = TypeRegistry::new();
        reg.register(
            TypeDef::new("Host")
                .field("HostId", "string")
                .field("Port", "int32"),
        )
        .unwrap();
        reg.register(
            TypeDef::new("Target")
                .field("TargetId", "string")
                .field("State", "TargetState")
                .map("Hosts", "string", "Host"),
        )
        .unwrap();
        reg
    }

    #[test]
    fn node_tree_flags() {
        let reg = registry();
        let node = reg.node("Target").unwrap();
        assert!(node.is_struct && !node.is_slice && !node.is_map);
        assert_eq!(node.field_name, "");

        let hosts = &node.attributes["Hosts"];
        assert!(hosts.is_struct && hosts.is_map);
        assert_eq!(hosts.key_type, "string");
        assert_eq!(hosts.parent_type, "Target");

        let state = &node.attributes["State"];
        assert!(!state.is_struct);
        assert_eq!(state.kind(), crate::Kind::Enum);
    }

    #[test]
    fn case_insensitive_resolution() {
        let reg = registry();
        assert_eq!(reg.resolve_type("target").as_deref(), Some("Target"));
        assert_eq!(
            reg.resolve_attr("Target", "targetid").as_deref(),
            Some("TargetId")
        );
        assert_eq!(reg.resolve_attr("Target", "nope"), None);
    }

    #[test]
    fn cyclic_graph_is_rejected() {
        let reg = TypeRegistry::new();
        reg.register(TypeDef::new("A").field("B", "B")).unwrap();
        reg.register(TypeDef::new("B").field("A", "A")).unwrap();
        match reg.node("A") {
            Err(SchemaError::CyclicType(_)) => {}
            other => panic!("expected cycle rejection, got {:?}", other),
        }
    }

    #[test]
    fn primary_key_value_joins_fields() {
        let reg = registry();
        reg.decorate_primary("Target", &["TargetId"]);
        let rec = Record::new("Target").set("TargetId", Value::str("80.50.40.1"));
        assert_eq!(reg.primary_key_value(&rec).as_deref(), Some("80.50.40.1"));

        let unkeyed = Record::new("Host").set("HostId", Value::str("h"));
        assert_eq!(reg.primary_key_value(&unkeyed), None);
    }
}
