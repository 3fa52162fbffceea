use pgstore::{SqlValue, Statement};
use query::Query;
use schema::{Record, Resources, TypeDef, TypeRegistry, Value};
use shred::{shred, Action};
use std::sync::Arc;

fn resources() -> Resources {
    let registry = TypeRegistry::new();
    registry
        .register(
            TypeDef::new("Host")
                .field("HostId", "string")
                .field("Port", "int32"),
        )
        .unwrap();
    registry
        .register(
            TypeDef::new("Target")
                .field("TargetId", "string")
                .field("State", "TargetState")
                .map("Hosts", "string", "Host"),
        )
        .unwrap();
    registry.decorate_primary("Target", &["TargetId"]);
    registry.decorate_non_unique("Target", &["State"]);
    Resources::new(Arc::new(registry))
}

fn statement(res: &Resources, type_name: &str, text: Option<&str>) -> Statement {
    let node = res.registry.node(type_name).unwrap();
    let mut table = shred::Table::new(type_name);
    table.set_columns(&node);
    let query = text.map(|t| Query::parse(t, &res.registry).unwrap());
    Statement::new(node, table.columns, query, res.clone())
}

#[test]
fn insert_is_an_upsert() {
    let res = resources();
    let mut stmt = statement(&res, "Target", None);
    assert_eq!(
        stmt.insert_sql(),
        "insert into Target (ParentKey,RecKey,State,TargetId) values ($1,$2,$3,$4) \
         ON CONFLICT (ParentKey,RecKey) DO UPDATE SET State=$3,TargetId=$4"
    );
}

#[test]
fn update_coalesces_every_attribute() {
    let res = resources();
    let mut stmt = statement(&res, "Target", None);
    assert_eq!(
        stmt.update_sql(),
        "UPDATE Target SET State=COALESCE($3, State), TargetId=COALESCE($4, TargetId) \
         WHERE ParentKey=$1 AND RecKey=$2"
    );
}

#[test]
fn select_without_query_lists_all_fields() {
    let res = resources();
    let mut stmt = statement(&res, "Target", None);
    assert_eq!(
        stmt.select_sql().unwrap(),
        "Select ParentKey,RecKey,State,TargetId from Target"
    );
}

#[test]
fn wildcard_equality_becomes_like() {
    let res = resources();
    let mut stmt = statement(&res, "Target", Some("select * from target where targetid='ab*'"));
    assert_eq!(
        stmt.select_sql().unwrap(),
        "Select ParentKey,RecKey,State,TargetId from Target where (TargetId LIKE 'ab%')"
    );
}

#[test]
fn wildcard_is_preserved_for_other_operators() {
    let res = resources();
    let mut stmt =
        statement(&res, "Target", Some("select * from target where targetid!='ab*'"));
    assert_eq!(
        stmt.select_sql().unwrap(),
        "Select ParentKey,RecKey,State,TargetId from Target where (TargetId != 'ab*')"
    );
}

#[test]
fn numeric_criteria_are_unquoted() {
    let res = resources();
    let mut stmt = statement(&res, "Target", Some("select * from target where state=1"));
    assert_eq!(
        stmt.select_sql().unwrap(),
        "Select ParentKey,RecKey,State,TargetId from Target where (State = 1)"
    );
}

#[test]
fn chained_criteria_nest_parenthesized() {
    let res = resources();
    let mut stmt = statement(
        &res,
        "Target",
        Some("select * from target where targetid='a' or targetid='b'"),
    );
    assert_eq!(
        stmt.select_sql().unwrap(),
        "Select ParentKey,RecKey,State,TargetId from Target \
         where (TargetId = 'a' or (TargetId = 'b'))"
    );
}

#[test]
fn paging_renders_limit_and_offset() {
    let res = resources();
    let mut stmt = statement(&res, "Target", Some("select * from target limit 10 page 2"));
    assert_eq!(
        stmt.select_sql().unwrap(),
        "Select ParentKey,RecKey,State,TargetId from Target LIMIT 10 OFFSET 20"
    );
}

#[test]
fn sort_renders_order_by() {
    let res = resources();
    let mut stmt = statement(
        &res,
        "Target",
        Some("select * from target sortby targetid descending"),
    );
    assert_eq!(
        stmt.select_sql().unwrap(),
        "Select ParentKey,RecKey,State,TargetId from Target ORDER BY TargetId DESC"
    );
}

#[test]
fn count_carries_the_criteria() {
    let res = resources();
    let mut stmt = statement(&res, "Target", Some("select * from target where state=2"));
    assert_eq!(
        stmt.count_sql(),
        "Select count(*) from Target where (State = 2)"
    );
}

#[test]
fn rec_keys_have_a_total_order() {
    let res = resources();
    let mut stmt = statement(
        &res,
        "Target",
        Some("select * from target where state=1 limit 10"),
    );
    assert_eq!(
        stmt.rec_keys_sql(),
        "Select RecKey from Target where (State = 1) ORDER BY RecKey ASC"
    );
}

#[test]
fn by_rec_keys_doubles_quotes() {
    let res = resources();
    let stmt = statement(&res, "Target", Some("select * from target limit 5"));
    let sql = stmt
        .select_by_rec_keys_sql(&["[a'b]".to_string(), "[c]".to_string()])
        .unwrap();
    assert_eq!(
        sql,
        "Select ParentKey,RecKey,State,TargetId from Target where RecKey in ('[a''b]','[c]')"
    );
    assert!(stmt.select_by_rec_keys_sql(&[]).is_none());
}

#[test]
fn deletes_by_prefix_and_criteria() {
    let res = resources();
    let child = statement(&res, "Host", None);
    assert_eq!(
        child.delete_sql(Some("[x]")),
        "DELETE FROM Host WHERE ParentKey LIKE '[x]%'"
    );
    assert_eq!(
        child
            .delete_by_keys_sql(&["[a]".to_string(), "[b]".to_string()])
            .unwrap(),
        "DELETE FROM Host WHERE ParentKey LIKE '[a]%' OR ParentKey LIKE '[b]%'"
    );
    assert!(child.delete_by_keys_sql(&[]).is_none());

    let root = statement(&res, "Target", Some("select * from target where state=1"));
    assert_eq!(
        root.delete_sql(None),
        "DELETE FROM Target WHERE (State = 1)"
    );
}

#[test]
fn projection_skips_tables_without_columns() {
    let res = resources();
    let text = "select hosts.hostid from target";

    let mut root = statement(&res, "Target", Some(text));
    assert!(root.select_sql().is_none());

    let mut child = statement(&res, "Host", Some(text));
    assert_eq!(
        child.select_sql().unwrap(),
        "Select ParentKey,RecKey,HostId from Host"
    );
}

#[test]
fn patch_zeros_become_typed_nulls() {
    let res = resources();
    let target = Value::Record(
        Record::new("Target")
            .set("TargetId", Value::str("t1"))
            .set("State", Value::I32(0)),
    );
    let bundle = shred(Action::Post, &[target], &[], &res).unwrap();
    let table = &bundle.tables["Target"];
    let row = &table.instance_rows[""].attribute_rows[""].rows[0];

    let stmt = statement(&res, "Target", None);

    let posted = stmt.row_values(Action::Post, row).unwrap();
    assert_eq!(posted[0], SqlValue::Text(Some("".to_string())));
    assert_eq!(posted[1], SqlValue::Text(Some("[t1]".to_string())));
    assert_eq!(posted[2], SqlValue::Int4(Some(0)));
    assert_eq!(posted[3], SqlValue::Text(Some("t1".to_string())));

    let patched = stmt.row_values(Action::Patch, row).unwrap();
    assert_eq!(patched[2], SqlValue::Int4(None));
    assert_eq!(patched[3], SqlValue::Text(Some("t1".to_string())));
}
