//! In-memory evaluation of query criteria against records, used by the
//! record cache so its pages agree with what the SQL translation of the
//! same criteria would return, including the `*` wildcard under `=`.

use query::{Comparator, Condition, Expression};
use schema::Record;

pub fn matches(criteria: Option<&Expression>, record: &Record) -> bool {
    match criteria {
        Some(expression) => eval_expression(expression, record),
        None => true,
    }
}

fn eval_expression(exp: &Expression, record: &Record) -> bool {
    let head = eval_condition(&exp.condition, record);
    match (&exp.next, exp.operator.as_str()) {
        (Some(next), "or") => head || eval_expression(next, record),
        (Some(next), _) => head && eval_expression(next, record),
        (None, _) => head,
    }
}

fn eval_condition(cond: &Condition, record: &Record) -> bool {
    let head = eval_comparator(&cond.comparator, record);
    match (&cond.next, cond.operator.as_str()) {
        (Some(next), "or") => head || eval_condition(next, record),
        (Some(next), _) => head && eval_condition(next, record),
        (None, _) => head,
    }
}

fn eval_comparator(comp: &Comparator, record: &Record) -> bool {
    let left = operand(record, comp.left_property.is_some(), &comp.left);
    let right = operand(record, comp.right_property.is_some(), &comp.right);

    if comp.operator == "=" {
        if comp.left_property.is_some() && comp.right_property.is_none() && right.contains('*') {
            return wildcard_match(&left, &right);
        }
        if comp.right_property.is_some() && comp.left_property.is_none() && left.contains('*') {
            return wildcard_match(&right, &left);
        }
    }

    // Numeric comparison when both sides parse; string ordering otherwise.
    let ordering = match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r),
        _ => Some(left.cmp(&right)),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match comp.operator.as_str() {
        "=" => ordering.is_eq(),
        "!=" => !ordering.is_eq(),
        "<" => ordering.is_lt(),
        ">" => ordering.is_gt(),
        "<=" => ordering.is_le(),
        ">=" => ordering.is_ge(),
        _ => false,
    }
}

fn operand(record: &Record, is_property: bool, text: &str) -> String {
    if is_property {
        record
            .get(text)
            .map(|v| v.plain_string())
            .unwrap_or_default()
    } else {
        text.to_string()
    }
}

// `ab*` matches any value starting with `ab`; `a*z` matches `a…z`; inner
// stars match in sequence.
fn wildcard_match(value: &str, pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = value;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(after) => rest = after,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(at) => rest = &rest[at + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use query::Query;
    use schema::{Record, TypeDef, TypeRegistry, Value};

    fn registry() -> TypeRegistry {
        let reg = TypeRegistry::new();
        reg.register(
            TypeDef::new("Target")
                .field("TargetId", "string")
                .field("State", "TargetState"),
        )
        .unwrap();
        reg
    }

    fn target(id: &str, state: i32) -> Record {
        Record::new("Target")
            .set("TargetId", Value::str(id))
            .set("State", Value::I32(state))
    }

    fn criteria_matches(text: &str, record: &Record) -> bool {
        let reg = registry();
        let q = Query::parse(text, &reg).unwrap();
        matches(q.criteria(), record)
    }

    #[test]
    fn equality_and_ordering() {
        let rec = target("a", 2);
        assert!(criteria_matches("select * from target where state=2", &rec));
        assert!(criteria_matches("select * from target where state>1", &rec));
        assert!(!criteria_matches("select * from target where state<2", &rec));
        assert!(criteria_matches("select * from target where targetid='a'", &rec));
        assert!(criteria_matches("select * from target where targetid!='b'", &rec));
    }

    #[test]
    fn and_or_chains() {
        let rec = target("a", 2);
        assert!(criteria_matches(
            "select * from target where targetid='a' and state=2",
            &rec
        ));
        assert!(!criteria_matches(
            "select * from target where targetid='a' and state=3",
            &rec
        ));
        assert!(criteria_matches(
            "select * from target where targetid='b' or state=2",
            &rec
        ));
    }

    #[test]
    fn wildcards_match_like_sql() {
        let rec = target("80.50.40.1", 1);
        assert!(criteria_matches(
            "select * from target where targetid='80.50*'",
            &rec
        ));
        assert!(criteria_matches(
            "select * from target where targetid='80*1'",
            &rec
        ));
        assert!(!criteria_matches(
            "select * from target where targetid='81*'",
            &rec
        ));
    }

    #[test]
    fn missing_fields_read_as_empty() {
        let rec = Record::new("Target");
        assert!(criteria_matches("select * from target where targetid=''", &rec));
        assert!(!criteria_matches(
            "select * from target where targetid='x'",
            &rec
        ));
    }
}
