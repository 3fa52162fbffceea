//! Criteria-to-SQL rendering: expressions parenthesize their nested chains,
//! comparators quote string-property literals, and a `*` inside a literal
//! compared with `=` rewrites to a LIKE pattern. Comparisons over
//! properties of other tables are filtered out.

use query::{Comparator, Condition, Expression, Query};

/// The WHERE body for `type_name`, or None when no comparison applies to
/// this table.
pub fn where_clause(query: &Query, type_name: &str) -> Option<String> {
    let criteria = query.criteria()?;
    if type_name != query.root_type() {
        return None;
    }
    expression(criteria, type_name)
}

/// ORDER BY for the query; rec-key reads always need a total order, so they
/// fall back to RecKey when no sort field is given.
pub fn order_clause(query: &Query, default_rec_key: bool) -> String {
    let direction = if query.descending() { "DESC" } else { "ASC" };
    if !query.sort_by().is_empty() {
        format!(" ORDER BY {} {}", query.sort_by(), direction)
    } else if default_rec_key {
        format!(" ORDER BY RecKey {direction}")
    } else {
        String::new()
    }
}

pub fn paging_clause(query: &Query) -> String {
    let mut clause = String::new();
    if query.limit() > 0 {
        clause.push_str(&format!(" LIMIT {}", query.limit()));
        if query.page() > 0 {
            clause.push_str(&format!(" OFFSET {}", query.page() * query.limit()));
        }
    }
    clause
}

fn expression(exp: &Expression, type_name: &str) -> Option<String> {
    let cond = condition(&exp.condition, type_name);
    let next = exp
        .next
        .as_ref()
        .and_then(|next| expression(next, type_name));
    match (cond, next) {
        (Some(cond), Some(next)) => Some(format!("({} {} {})", cond, exp.operator, next)),
        (Some(cond), None) => Some(format!("({cond})")),
        (None, Some(next)) => Some(format!("({next})")),
        (None, None) => None,
    }
}

fn condition(cond: &Condition, type_name: &str) -> Option<String> {
    let comp = comparator(&cond.comparator, type_name);
    let next = cond
        .next
        .as_ref()
        .and_then(|next| condition(next, type_name));
    match (comp, next) {
        (Some(comp), Some(next)) => Some(format!("{} {} {}", comp, cond.operator, next)),
        (Some(comp), None) => Some(comp),
        (None, Some(next)) => Some(next),
        (None, None) => None,
    }
}

fn comparator(comp: &Comparator, type_name: &str) -> Option<String> {
    let left_of_table = comp
        .left_property
        .as_ref()
        .map_or(false, |p| p.parent_type == type_name);
    let right_of_table = comp
        .right_property
        .as_ref()
        .map_or(false, |p| p.parent_type == type_name);
    if !left_of_table && !right_of_table {
        return None;
    }

    let left_string = left_of_table
        && comp
            .left_property
            .as_ref()
            .map_or(false, |p| p.is_string());
    let right_string = right_of_table
        && comp
            .right_property
            .as_ref()
            .map_or(false, |p| p.is_string());

    if left_string && !right_string {
        let (op, literal) = rewrite_wildcard(&comp.operator, &comp.right);
        Some(format!("{} {} '{}'", comp.left, op, literal))
    } else if !left_string && right_string {
        let (op, literal) = rewrite_wildcard(&comp.operator, &comp.left);
        Some(format!("'{}' {} {}", literal, op, comp.right))
    } else {
        Some(format!("{} {} {}", comp.left, comp.operator, comp.right))
    }
}

// `abc*def` compared with `=` becomes `LIKE 'abc%def'`; every other
// operator preserves the literal untouched.
fn rewrite_wildcard(operator: &str, literal: &str) -> (String, String) {
    let escaped = literal.replace('\'', "''");
    if operator == "=" && escaped.contains('*') {
        ("LIKE".to_string(), escaped.replace('*', "%"))
    } else {
        (operator.to_string(), escaped)
    }
}
