use crate::parse::{self, ParseError};
use schema::TypeRegistry;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Property is a resolved reference to an attribute reachable from the
/// query's root type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Resolved attribute names from the root type down to the field.
    pub path: Vec<String>,
    /// The struct type owning the final attribute.
    pub parent_type: String,
    /// The final attribute name, in its registered casing.
    pub field_name: String,
    /// The attribute's scalar or element type name.
    pub type_name: String,
}

impl Property {
    /// Root-relative dotted identifier of the property.
    pub fn property_id(&self) -> String {
        self.path.join(".")
    }

    pub fn is_string(&self) -> bool {
        self.type_name == "string"
    }
}

/// Comparator is one predicate leaf: `left op right`, where each side is
/// either a resolved property (the column name) or a bare literal with any
/// surrounding quotes already stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparator {
    pub left: String,
    pub operator: String,
    pub right: String,
    pub left_property: Option<Property>,
    pub right_property: Option<Property>,
}

/// Condition chains comparators with and/or at the inner level.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub comparator: Comparator,
    pub operator: String,
    pub next: Option<Box<Condition>>,
}

/// Expression chains conditions with and/or; nested groups hang off `next`
/// and are parenthesized when rendered to SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub condition: Condition,
    pub operator: String,
    pub next: Option<Box<Expression>>,
}

/// Query is the structured form every read and delete consumes: root type,
/// optional projection, optional criteria, sort, and paging. `hash()` is
/// stable for the lifetime of the process and fingerprints the whole query
/// for the paged read index.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) root_type: String,
    pub(crate) properties: Vec<Property>,
    pub(crate) criteria: Option<Expression>,
    pub(crate) sort_by: String,
    pub(crate) descending: bool,
    pub(crate) limit: u32,
    pub(crate) page: u32,
    pub(crate) text: String,
}

impl Query {
    /// Parse the textual dialect: `select <*|props> from <type> [where …]
    /// [sortby <field>] [descending] [limit <n>] [page <n>]`. Type and
    /// attribute names resolve case-insensitively against the registry.
    pub fn parse(text: &str, registry: &TypeRegistry) -> Result<Query, ParseError> {
        parse::parse(text, registry)
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn criteria(&self) -> Option<&Expression> {
        self.criteria.as_ref()
    }

    pub fn sort_by(&self) -> &str {
        &self.sort_by
    }

    pub fn descending(&self) -> bool {
        self.descending
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The paged-index fingerprint of this query: root type, projection,
    /// criteria, and sort, but never `limit`/`page` — one index entry holds
    /// the full rec-key list of a query and every page slices out of it.
    pub fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.root_type.hash(&mut hasher);
        for property in &self.properties {
            property.property_id().hash(&mut hasher);
        }
        if let Some(criteria) = &self.criteria {
            hash_expression(criteria, &mut hasher);
        }
        self.sort_by.hash(&mut hasher);
        self.descending.hash(&mut hasher);
        hasher.finish()
    }

    /// The transaction-coordination key of this query: the primary-key
    /// equality literals of its criteria, joined in encounter order, or the
    /// normalized text when the criteria carry no primary-key predicate.
    pub fn key_of(&self, registry: &TypeRegistry) -> String {
        let primary = registry.primary_fields(&self.root_type);
        let mut parts = Vec::new();
        let mut expr = self.criteria.as_ref();
        while let Some(e) = expr {
            let mut cond = Some(&e.condition);
            while let Some(c) = cond {
                let comp = &c.comparator;
                if comp.operator == "=" {
                    if let Some(p) = &comp.left_property {
                        if primary.contains(&p.field_name) && comp.right_property.is_none() {
                            parts.push(comp.right.clone());
                        }
                    } else if let Some(p) = &comp.right_property {
                        if primary.contains(&p.field_name) {
                            parts.push(comp.left.clone());
                        }
                    }
                }
                cond = c.next.as_deref();
            }
            expr = e.next.as_deref();
        }
        if parts.is_empty() {
            normalized(&self.text)
        } else {
            parts.join(",")
        }
    }
}

fn hash_expression(exp: &Expression, hasher: &mut DefaultHasher) {
    let mut condition = Some(&exp.condition);
    while let Some(cond) = condition {
        let comp = &cond.comparator;
        comp.left.hash(hasher);
        comp.operator.hash(hasher);
        comp.right.hash(hasher);
        cond.operator.hash(hasher);
        condition = cond.next.as_deref();
    }
    exp.operator.hash(hasher);
    if let Some(next) = &exp.next {
        hash_expression(next, hasher);
    }
}

pub(crate) fn normalized(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
