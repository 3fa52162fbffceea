use schema::{Record, Resources, TypeDef, TypeRegistry, Value};
use shred::{name_of_field, reassemble, shred, Action, ShredError};
use std::sync::Arc;

fn resources() -> Resources {
    let registry = TypeRegistry::new();
    registry
        .register(
            TypeDef::new("SubModel")
                .field("Name", "string")
                .field("Level", "int32"),
        )
        .unwrap();
    registry
        .register(
            TypeDef::new("Host")
                .field("HostId", "string")
                .field("Port", "int32"),
        )
        .unwrap();
    registry
        .register(
            TypeDef::new("Model")
                .field("Id", "string")
                .field("Count", "int32")
                .field("Flags", "bool")
                .slice("Tags", "string")
                .field("Sub", "SubModel")
                .map("Hosts", "string", "Host"),
        )
        .unwrap();
    registry.decorate_primary("Model", &["Id"]);
    Resources::new(Arc::new(registry))
}

fn model(id: &str, count: i32) -> Value {
    let sub = Record::new("SubModel")
        .set("Name", Value::str("inner"))
        .set("Level", Value::I32(3));
    let hosts = Value::map_of(vec![
        (
            Value::str("h1"),
            Value::Record(
                Record::new("Host")
                    .set("HostId", Value::str("h1"))
                    .set("Port", Value::I32(22)),
            ),
        ),
        (
            Value::str("h2"),
            Value::Record(
                Record::new("Host")
                    .set("HostId", Value::str("h2"))
                    .set("Port", Value::I32(80)),
            ),
        ),
    ]);
    Value::Record(
        Record::new("Model")
            .set("Id", Value::str(id))
            .set("Count", Value::I32(count))
            .set("Flags", Value::Bool(true))
            .set(
                "Tags",
                Value::List(vec![Value::str("a"), Value::str("b")]),
            )
            .set("Sub", Value::Record(sub))
            .set("Hosts", hosts),
    )
}

#[test]
fn round_trip_identity() {
    let res = resources();
    let before = model("m1", 7);

    let bundle = shred(Action::Post, &[before.clone()], &[], &res).unwrap();
    assert_eq!(bundle.root_type, "Model");
    assert_eq!(bundle.tables.len(), 3, "one table per struct type");

    let result = reassemble(&bundle, None, &res).unwrap();
    assert_eq!(result.elements.len(), 1);
    assert_eq!(result.elements[0], before);
}

#[test]
fn batch_round_trip_matches_by_primary_key() {
    let res = resources();
    let before1 = model("m1", 1);
    let before2 = model("m2", 2);

    let bundle = shred(
        Action::Post,
        &[before1.clone(), before2.clone()],
        &[],
        &res,
    )
    .unwrap();
    let result = reassemble(&bundle, None, &res).unwrap();
    assert_eq!(result.elements.len(), 2);

    for before in [&before1, &before2] {
        let id = before.as_record().unwrap().get("Id").unwrap();
        let found = result
            .elements
            .iter()
            .find(|e| e.as_record().unwrap().get("Id") == Some(id))
            .expect("element missing from batch");
        assert_eq!(found, before);
    }
}

#[test]
fn key_discipline() {
    let res = resources();
    let bundle = shred(Action::Post, &[model("m1", 1)], &[], &res).unwrap();

    let root_rows = &bundle.tables["Model"].instance_rows[""].attribute_rows[""].rows;
    assert_eq!(root_rows.len(), 1);
    assert_eq!(root_rows[0].parent_key, "");
    assert_eq!(root_rows[0].rec_key, "[m1]");

    // Children hang off the concatenated full key of their parent.
    let hosts = &bundle.tables["Host"].instance_rows["[m1]"].attribute_rows["Hosts"].rows;
    assert_eq!(hosts.len(), 2);
    assert!(hosts.iter().any(|r| r.rec_key == "Hosts[string:h1]"));
    assert!(hosts.iter().any(|r| r.rec_key == "Hosts[string:h2]"));

    let subs = &bundle.tables["SubModel"].instance_rows["[m1]"].attribute_rows["Sub"].rows;
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].rec_key, "Sub[]");
}

#[test]
fn scalar_slice_occupies_one_column() {
    let res = resources();
    let bundle = shred(Action::Post, &[model("m1", 1)], &[], &res).unwrap();
    let table = &bundle.tables["Model"];

    // Tags is a column of the Model table, not a table of its own.
    assert!(table.columns.contains_key("Tags"));
    assert!(!bundle.tables.contains_key("string"));

    let row = &table.instance_rows[""].attribute_rows[""].rows[0];
    let data = &row.column_values[&table.columns["Tags"]];
    let value = res.codec.decode(data).unwrap();
    assert_eq!(
        value,
        Value::List(vec![Value::str("a"), Value::str("b")])
    );
}

#[test]
fn patch_skips_zero_values() {
    let res = resources();
    let partial = Value::Record(
        Record::new("Model")
            .set("Id", Value::str("m1"))
            .set("Count", Value::I32(0))
            .set("Flags", Value::Bool(false)),
    );
    let bundle = shred(Action::Patch, &[partial], &[], &res).unwrap();
    let table = &bundle.tables["Model"];
    let row = &table.instance_rows[""].attribute_rows[""].rows[0];

    assert!(row.column_values.contains_key(&table.columns["Id"]));
    assert!(!row.column_values.contains_key(&table.columns["Count"]));
    assert!(!row.column_values.contains_key(&table.columns["Flags"]));
}

#[test]
fn absent_fields_stay_absent() {
    let res = resources();
    let sparse = Value::Record(Record::new("Model").set("Id", Value::str("m1")));
    let bundle = shred(Action::Post, &[sparse.clone()], &[], &res).unwrap();
    let result = reassemble(&bundle, None, &res).unwrap();
    assert_eq!(result.elements[0], sparse);
}

#[test]
fn sparse_slice_index_is_an_error() {
    let res = resources();
    let registry = &res.registry;
    registry
        .register(
            TypeDef::new("Chain")
                .field("ChainId", "string")
                .slice("Links", "SubModel"),
        )
        .unwrap();
    registry.decorate_primary("Chain", &["ChainId"]);

    let chain = Value::Record(
        Record::new("Chain")
            .set("ChainId", Value::str("c1"))
            .set(
                "Links",
                Value::List(vec![Value::Record(
                    Record::new("SubModel").set("Name", Value::str("n")),
                )]),
            ),
    );
    let mut bundle = shred(Action::Post, &[chain], &[], &res).unwrap();

    // Rewrite the sole link's index out of range.
    let rows = &mut bundle
        .tables
        .get_mut("SubModel")
        .unwrap()
        .instance_rows
        .get_mut("[c1]")
        .unwrap()
        .attribute_rows
        .get_mut("Links")
        .unwrap()
        .rows;
    rows[0].rec_key = "Links[5]".to_string();

    match reassemble(&bundle, None, &res) {
        Err(ShredError::SliceIndex { index: 5, .. }) => {}
        other => panic!("expected slice index error, got {:?}", other),
    }
}

#[test]
fn unknown_root_type_is_an_error() {
    let res = resources();
    let stranger = Value::Record(Record::new("Stranger"));
    match shred(Action::Post, &[stranger], &[], &res) {
        Err(ShredError::Schema(schema::SchemaError::UnknownType(t))) => {
            assert_eq!(t, "Stranger")
        }
        other => panic!("expected unknown type, got {:?}", other),
    }
}

#[test]
fn field_name_of_rec_key() {
    assert_eq!(name_of_field("Hosts[string:h1]"), "Hosts");
    assert_eq!(name_of_field("[m1]"), "");
    assert_eq!(name_of_field("plain"), "plain");
}
