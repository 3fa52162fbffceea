use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind classifies the scalar column type an attribute maps to. Type names
/// outside the primitive set are enumerations and persist as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Str,
    I32,
    I64,
    F32,
    F64,
    Bool,
    Enum,
}

impl Kind {
    pub fn of(type_name: &str) -> Kind {
        match type_name {
            "string" => Kind::Str,
            "int32" => Kind::I32,
            "int64" => Kind::I64,
            "float32" => Kind::F32,
            "float64" => Kind::F64,
            "bool" => Kind::Bool,
            _ => Kind::Enum,
        }
    }

    pub fn zero(&self) -> Value {
        match self {
            Kind::Str => Value::Str(String::new()),
            Kind::I32 | Kind::Enum => Value::I32(0),
            Kind::I64 => Value::I64(0),
            Kind::F32 => Value::F32(0.0),
            Kind::F64 => Value::F64(0.0),
            Kind::Bool => Value::Bool(false),
        }
    }
}

/// Node is one type-metadata descriptor: a type viewed through the
/// attribute that holds it. The flags are independent: a map-of-struct
/// attribute has both `is_map` and `is_struct` set, a slice of scalars has
/// only `is_slice`. Struct-typed nodes carry their attributes; each
/// attribute is itself a Node whose `field_name` is its name in the parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Struct type name, or the scalar/element type name.
    pub type_name: String,
    /// Name of the attribute holding this node in its parent; empty at the
    /// root.
    pub field_name: String,
    /// Type name of the owning struct; empty at the root.
    pub parent_type: String,
    /// Scalar type name of map keys; empty unless `is_map`.
    pub key_type: String,
    pub is_struct: bool,
    pub is_slice: bool,
    pub is_map: bool,
    pub attributes: BTreeMap<String, Node>,
}

impl Node {
    /// Scalar attributes occupy one column each; struct attributes live in
    /// their own table.
    pub fn is_column(&self) -> bool {
        !self.is_struct
    }

    pub fn kind(&self) -> Kind {
        Kind::of(&self.type_name)
    }

    /// All struct-typed attribute nodes, i.e. the child tables of this type.
    pub fn struct_attributes(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.attributes.iter().filter(|(_, a)| a.is_struct)
    }

    pub fn column_attributes(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.attributes.iter().filter(|(_, a)| !a.is_struct)
    }
}
