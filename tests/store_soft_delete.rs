use tiergraph::model::{ComponentKind, Layer, RelKind};
use tiergraph::store::Store;

fn open_store(dir: &tempfile::TempDir) -> Store {
    Store::open(&dir.path().join("test.sqlite")).unwrap()
}

fn seed_file(store: &Store) -> i64 {
    let project_id = store.upsert_project("test", "/tmp/fixture").unwrap();
    store
        .upsert_file(project_id, "mappers/order.xml", "mapping-file", "h1")
        .unwrap()
}

#[test]
fn soft_deleted_rows_stay_retrievable_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let file_id = seed_file(&store);

    let unit = store
        .upsert_component(file_id, None, &ComponentKind::Unit, "orderMapper", Layer::Mapping.as_str())
        .unwrap();
    let stmt = store
        .upsert_component(
            file_id,
            Some(unit),
            &ComponentKind::SqlSelect,
            "orderMapper.selectOrders",
            Layer::Mapping.as_str(),
        )
        .unwrap();
    let edge = store
        .upsert_relationship(unit, stmt, &RelKind::Other("contains".into()))
        .unwrap();

    store.soft_delete_component(stmt).unwrap();
    store.soft_delete_relationship(edge).unwrap();

    // Gone from live views, still addressable by id.
    assert!(store.find_live_statement("orderMapper.selectOrders").unwrap().is_none());
    assert!(store.live_relationships(None).unwrap().is_empty());
    let row = store.component_by_id(stmt).unwrap().unwrap();
    assert!(row.deleted);
    assert_eq!(row.component_name, "orderMapper.selectOrders");
    let rel = store.relationship_by_id(edge).unwrap().unwrap();
    assert!(rel.deleted);
}

#[test]
fn upsert_resurrects_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let file_id = seed_file(&store);

    let first = store
        .upsert_component(file_id, None, &ComponentKind::Unit, "orderMapper", Layer::Mapping.as_str())
        .unwrap();
    store.soft_delete_component(first).unwrap();
    let second = store
        .upsert_component(file_id, None, &ComponentKind::Unit, "orderMapper", Layer::Mapping.as_str())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(store.live_components_for_file(file_id).unwrap().len(), 1);
}

#[test]
fn self_loop_edges_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let file_id = seed_file(&store);
    let unit = store
        .upsert_component(file_id, None, &ComponentKind::Unit, "orderMapper", Layer::Mapping.as_str())
        .unwrap();
    assert!(store.upsert_relationship(unit, unit, &RelKind::CallsMethod).is_err());
}

#[test]
fn sql_content_round_trips_and_table_columns_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let file_id = seed_file(&store);
    let stmt = store
        .upsert_component(
            file_id,
            None,
            &ComponentKind::SqlSelect,
            "orderMapper.selectOrders",
            Layer::Mapping.as_str(),
        )
        .unwrap();
    store
        .put_sql_content(stmt, file_id, "select", "SELECT * FROM ORDERS")
        .unwrap();
    let content = store.get_sql_content(stmt).unwrap().unwrap();
    assert_eq!(content.sql_text, "SELECT * FROM ORDERS");
    assert_eq!(content.query_type, "select");

    let table = store.ensure_table_component("ORDERS", file_id).unwrap();
    assert_eq!(store.ensure_table_component("ORDERS", file_id).unwrap(), table);
    let col_a = store.upsert_table_column(table, "ID").unwrap();
    let col_b = store.upsert_table_column(table, "ID").unwrap();
    assert_eq!(col_a, col_b);
}
