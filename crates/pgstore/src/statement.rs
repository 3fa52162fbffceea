use crate::query_sql::{order_clause, paging_clause, where_clause};
use crate::StoreError;
use itertools::Itertools;
use query::Query;
use schema::{typed, Kind, Node, Resources, Value};
use shred::{Action, Row};
use sqlx::postgres::PgArguments;
use sqlx::Row as _;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// SqlValue is one bound statement argument. Every variant is optional so a
/// NULL still carries its column's SQL type and binds cleanly.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Float4(Option<f32>),
    Float8(Option<f64>),
    Bool(Option<bool>),
}

impl SqlValue {
    fn null_of(kind: Kind) -> SqlValue {
        match kind {
            Kind::Str => SqlValue::Text(None),
            Kind::I32 | Kind::Enum => SqlValue::Int4(None),
            Kind::I64 => SqlValue::Int8(None),
            Kind::F32 => SqlValue::Float4(None),
            Kind::F64 => SqlValue::Float8(None),
            Kind::Bool => SqlValue::Bool(None),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Int4(v) => v.is_none(),
            SqlValue::Int8(v) => v.is_none(),
            SqlValue::Float4(v) => v.is_none(),
            SqlValue::Float8(v) => v.is_none(),
            SqlValue::Bool(v) => v.is_none(),
        }
    }
}

/// Bind one argument onto a runtime query.
pub fn bind<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    value: &SqlValue,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        SqlValue::Text(v) => q.bind(v.clone()),
        SqlValue::Int4(v) => q.bind(*v),
        SqlValue::Int8(v) => q.bind(*v),
        SqlValue::Float4(v) => q.bind(*v),
        SqlValue::Float8(v) => q.bind(*v),
        SqlValue::Bool(v) => q.bind(*v),
    }
}

/// Statement owns the SQL text of every operation against one table, bound
/// to that table's type node, its bundle column map, and (for reads and
/// deletes) the active query. Text is generated once and cached for the
/// statement's lifetime; prepared-statement reuse itself is the driver's
/// per-connection cache.
pub struct Statement {
    node: Arc<Node>,
    columns: BTreeMap<String, i32>,
    query: Option<Query>,
    res: Resources,

    /// ParentKey, RecKey, then the selected attributes in column order.
    fields: Vec<String>,
    /// Field name to 1-based statement-argument position.
    positions: HashMap<String, usize>,

    insert: Option<String>,
    update: Option<String>,
    select: Option<Option<String>>,
    count: Option<String>,
    rec_keys: Option<String>,
}

impl Statement {
    pub fn new(
        node: Arc<Node>,
        columns: BTreeMap<String, i32>,
        query: Option<Query>,
        res: Resources,
    ) -> Self {
        let fields = match &query {
            Some(q) if !q.properties().is_empty() => {
                let mut fields = vec!["ParentKey".to_string(), "RecKey".to_string()];
                fields.extend(
                    q.properties()
                        .iter()
                        .filter(|p| p.parent_type == node.type_name)
                        .map(|p| p.field_name.clone()),
                );
                fields
            }
            _ => fields_of(&node),
        };
        let positions = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i + 1))
            .collect();
        Self {
            node,
            columns,
            query,
            res,
            fields,
            positions,
            insert: None,
            update: None,
            select: None,
            count: None,
            rec_keys: None,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// `INSERT … ON CONFLICT (ParentKey, RecKey) DO UPDATE SET …` — the
    /// upsert every POST and PUT row runs through.
    pub fn insert_sql(&mut self) -> &str {
        if self.insert.is_none() {
            let names = self.fields.iter().join(",");
            let params = (1..=self.fields.len()).map(|i| format!("${i}")).join(",");
            let conflict = self
                .fields
                .iter()
                .filter(|f| *f != "ParentKey" && *f != "RecKey")
                .map(|f| format!("{f}=${}", self.positions[f]))
                .join(",");
            self.insert = Some(format!(
                "insert into {} ({}) values ({}) ON CONFLICT (ParentKey,RecKey) DO UPDATE SET {}",
                self.node.type_name, names, params, conflict
            ));
        }
        self.insert.as_deref().unwrap()
    }

    /// `UPDATE … SET a=COALESCE($n, a) …` — PATCH rows pass NULL for
    /// untouched attributes and COALESCE preserves the existing column.
    pub fn update_sql(&mut self) -> &str {
        if self.update.is_none() {
            let sets = self
                .fields
                .iter()
                .filter(|f| *f != "ParentKey" && *f != "RecKey")
                .map(|f| format!("{f}=COALESCE(${}, {f})", self.positions[f]))
                .join(", ");
            self.update = Some(format!(
                "UPDATE {} SET {} WHERE ParentKey=$1 AND RecKey=$2",
                self.node.type_name, sets
            ));
        }
        self.update.as_deref().unwrap()
    }

    /// The SELECT for this table, query-aware. Returns None when the
    /// query's projection contributes no columns beyond the keys, in which
    /// case the executor skips the table entirely.
    pub fn select_sql(&mut self) -> Option<&str> {
        if self.select.is_none() {
            self.select = Some(self.build_select());
        }
        self.select.as_ref().unwrap().as_deref()
    }

    fn build_select(&self) -> Option<String> {
        let Some(query) = &self.query else {
            return Some(format!(
                "Select {} from {}",
                self.fields.iter().join(","),
                self.node.type_name
            ));
        };
        if !query.properties().is_empty() && self.fields.len() == 2 {
            return None;
        }
        let mut sql = format!(
            "Select {} from {}",
            self.fields.iter().join(","),
            self.node.type_name
        );
        if self.node.type_name == query.root_type() {
            if let Some(clause) = where_clause(query, &self.node.type_name) {
                sql.push_str(" where ");
                sql.push_str(&clause);
            }
            sql.push_str(&order_clause(query, false));
            sql.push_str(&paging_clause(query));
        }
        Some(sql)
    }

    /// `SELECT COUNT(*) …` with the query's criteria; feeds the `Total`
    /// metadata count.
    pub fn count_sql(&mut self) -> &str {
        if self.count.is_none() {
            let mut sql = format!("Select count(*) from {}", self.node.type_name);
            if let Some(query) = &self.query {
                if let Some(clause) = where_clause(query, &self.node.type_name) {
                    sql.push_str(" where ");
                    sql.push_str(&clause);
                }
            }
            self.count = Some(sql);
        }
        self.count.as_deref().unwrap()
    }

    /// All matching root rec-keys in sort order; no LIMIT/OFFSET — the
    /// paged index slices pages out of the full list.
    pub fn rec_keys_sql(&mut self) -> &str {
        if self.rec_keys.is_none() {
            let mut sql = format!("Select RecKey from {}", self.node.type_name);
            if let Some(query) = &self.query {
                if let Some(clause) = where_clause(query, &self.node.type_name) {
                    sql.push_str(" where ");
                    sql.push_str(&clause);
                }
                sql.push_str(&order_clause(query, true));
            }
            self.rec_keys = Some(sql);
        }
        self.rec_keys.as_deref().unwrap()
    }

    /// ParentKey and RecKey of every matching row; the delete path derives
    /// the child-table key prefixes from these.
    pub fn root_keys_sql(&self) -> String {
        let mut sql = format!("Select ParentKey,RecKey from {}", self.node.type_name);
        if let Some(query) = &self.query {
            if let Some(clause) = where_clause(query, &self.node.type_name) {
                sql.push_str(" where ");
                sql.push_str(&clause);
            }
        }
        sql
    }

    /// The page-serving select: full column list restricted to the given
    /// rec-keys. Single quotes inside keys are doubled.
    pub fn select_by_rec_keys_sql(&self, keys: &[String]) -> Option<String> {
        if keys.is_empty() {
            return None;
        }
        let list = keys
            .iter()
            .map(|k| format!("'{}'", k.replace('\'', "''")))
            .join(",");
        Some(format!(
            "Select {} from {} where RecKey in ({})",
            self.fields.iter().join(","),
            self.node.type_name,
            list
        ))
    }

    /// DELETE for this table: a ParentKey prefix pattern for child tables,
    /// or the query criteria for the root.
    pub fn delete_sql(&self, parent_key_pattern: Option<&str>) -> String {
        let mut sql = format!("DELETE FROM {}", self.node.type_name);
        if let Some(pattern) = parent_key_pattern {
            sql.push_str(&format!(
                " WHERE ParentKey LIKE '{}%'",
                pattern.replace('\'', "''")
            ));
        } else if let Some(query) = &self.query {
            if let Some(clause) = where_clause(query, &self.node.type_name) {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
        }
        sql
    }

    /// Child-table DELETE across every matching root key, one LIKE disjunct
    /// per key. None when there is nothing to delete.
    pub fn delete_by_keys_sql(&self, keys: &[String]) -> Option<String> {
        if keys.is_empty() {
            return None;
        }
        let clauses = keys
            .iter()
            .map(|k| format!("ParentKey LIKE '{}%'", k.replace('\'', "''")))
            .join(" OR ");
        Some(format!(
            "DELETE FROM {} WHERE {}",
            self.node.type_name, clauses
        ))
    }

    /// The argument vector of one row: ParentKey, RecKey, then every
    /// selected attribute decoded from its column payload. Slices and maps
    /// render to their typed-string form; an absent payload is a typed
    /// NULL, and so is a zero value under PATCH.
    pub fn row_values(&self, action: Action, row: &Row) -> Result<Vec<SqlValue>, StoreError> {
        let mut result = vec![SqlValue::Text(None); self.fields.len()];
        result[0] = SqlValue::Text(Some(row.parent_key.clone()));
        result[1] = SqlValue::Text(Some(row.rec_key.clone()));

        for (name, attr) in self.node.column_attributes() {
            let Some(position) = self.positions.get(name) else {
                continue;
            };
            let Some(col) = self.columns.get(name) else {
                continue;
            };
            let slot = position - 1;
            let data = row.column_values.get(col);
            let Some(data) = data.filter(|d| !d.is_empty()) else {
                result[slot] = SqlValue::null_of(column_kind(attr));
                continue;
            };
            let value = self.res.codec.decode(data)?;
            if action == Action::Patch && value.is_zero() {
                result[slot] = SqlValue::null_of(column_kind(attr));
                continue;
            }
            result[slot] = to_sql_value(&value, attr);
        }
        Ok(result)
    }

    /// Scan a database row back into a bundle row: every selected attribute
    /// is re-encoded through the codec, with slice/map columns parsed from
    /// their typed-string form first. NULL columns stay absent.
    pub fn scan_row(&self, pg_row: &sqlx::postgres::PgRow) -> Result<Row, StoreError> {
        let mut row = Row {
            parent_key: pg_row.try_get::<String, _>(0)?,
            rec_key: pg_row.try_get::<String, _>(1)?,
            column_values: BTreeMap::new(),
        };
        for (i, field) in self.fields.iter().enumerate().skip(2) {
            let Some(attr) = self.node.attributes.get(field) else {
                continue;
            };
            let Some(col) = self.columns.get(field) else {
                continue;
            };
            let value = if attr.is_slice || attr.is_map {
                match pg_row.try_get::<Option<String>, _>(i)? {
                    Some(text) => Some(typed::parse_typed_string(&text)?),
                    None => None,
                }
            } else {
                match column_kind(attr) {
                    Kind::Str => pg_row.try_get::<Option<String>, _>(i)?.map(Value::Str),
                    Kind::I32 | Kind::Enum => {
                        pg_row.try_get::<Option<i32>, _>(i)?.map(Value::I32)
                    }
                    Kind::I64 => pg_row.try_get::<Option<i64>, _>(i)?.map(Value::I64),
                    Kind::F32 => pg_row.try_get::<Option<f32>, _>(i)?.map(Value::F32),
                    Kind::F64 => pg_row.try_get::<Option<f64>, _>(i)?.map(Value::F64),
                    Kind::Bool => pg_row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
                }
            };
            if let Some(value) = value {
                row.column_values.insert(*col, self.res.codec.encode(&value)?);
            }
        }
        Ok(row)
    }
}

/// ParentKey and RecKey always lead, followed by the scalar attributes in
/// their column order.
fn fields_of(node: &Node) -> Vec<String> {
    let mut fields = vec!["ParentKey".to_string(), "RecKey".to_string()];
    fields.extend(node.column_attributes().map(|(name, _)| name.clone()));
    fields
}

fn column_kind(attr: &Node) -> Kind {
    if attr.is_slice || attr.is_map {
        Kind::Str
    } else {
        attr.kind()
    }
}

fn to_sql_value(value: &Value, attr: &Node) -> SqlValue {
    if attr.is_slice || attr.is_map {
        return SqlValue::Text(Some(typed::to_typed_string(value)));
    }
    match value {
        Value::Str(s) => SqlValue::Text(Some(s.clone())),
        Value::I32(n) => SqlValue::Int4(Some(*n)),
        Value::I64(n) => SqlValue::Int8(Some(*n)),
        Value::F32(f) => SqlValue::Float4(Some(*f)),
        Value::F64(f) => SqlValue::Float8(Some(*f)),
        Value::Bool(b) => SqlValue::Bool(Some(*b)),
        other => SqlValue::Text(Some(typed::to_typed_string(other))),
    }
}
