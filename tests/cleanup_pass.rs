use tiergraph::cleanup;
use tiergraph::model::{ComponentKind, Layer, RelKind};
use tiergraph::store::Store;

/// Seeds a store with one class unit, one handler method, one well-formed
/// endpoint, and one malformed endpoint wired to the same method.
fn seed_store(store: &Store) -> (i64, i64) {
    let project_id = store.upsert_project("test", "/tmp/fixture").unwrap();
    let file_id = store
        .upsert_file(project_id, "web/OrderController.java", "class-source", "h1")
        .unwrap();
    let unit = store
        .upsert_component(
            file_id,
            None,
            &ComponentKind::Unit,
            "OrderController",
            Layer::Control.as_str(),
        )
        .unwrap();
    let method = store
        .upsert_component(
            file_id,
            Some(unit),
            &ComponentKind::Method,
            "OrderController.listOrders",
            Layer::Control.as_str(),
        )
        .unwrap();
    let good = store
        .upsert_component(
            file_id,
            Some(method),
            &ComponentKind::Endpoint,
            "/orders:GET",
            Layer::Control.as_str(),
        )
        .unwrap();
    let bad = store
        .upsert_component(
            file_id,
            Some(method),
            &ComponentKind::Endpoint,
            "/:GET",
            Layer::Control.as_str(),
        )
        .unwrap();
    store
        .upsert_relationship(good, method, &RelKind::CallsMethod)
        .unwrap();
    store
        .upsert_relationship(bad, method, &RelKind::CallsMethod)
        .unwrap();
    (good, bad)
}

#[test]
fn malformed_endpoints_are_retired_with_their_edges() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("test.sqlite")).unwrap();
    let (good, bad) = seed_store(&store);

    let report = cleanup::run(&store).unwrap();
    assert_eq!(report.scanned_endpoints, 2);
    assert_eq!(report.removed_components, 1);
    assert_eq!(report.removed_relationships, 1);
    assert_eq!(
        report.after.components,
        report.before.components - report.removed_components
    );

    let bad_row = store.component_by_id(bad).unwrap().unwrap();
    assert!(bad_row.deleted);
    let good_row = store.component_by_id(good).unwrap().unwrap();
    assert!(!good_row.deleted);

    // The surviving endpoint keeps its edge.
    let edges = store
        .live_relationships(Some(&RelKind::CallsMethod))
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].src_id, good);
}

#[test]
fn cleanup_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("test.sqlite")).unwrap();
    seed_store(&store);

    cleanup::run(&store).unwrap();
    let counts = store.live_counts().unwrap();
    let second = cleanup::run(&store).unwrap();
    assert_eq!(second.removed_components, 0);
    assert_eq!(second.removed_relationships, 0);
    assert_eq!(second.before, second.after);
    assert_eq!(store.live_counts().unwrap(), counts);
}

#[test]
fn cleanup_on_a_clean_store_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("test.sqlite")).unwrap();
    let report = cleanup::run(&store).unwrap();
    assert_eq!(report.scanned_endpoints, 0);
    assert_eq!(report.removed_components, 0);
    assert_eq!(report.before, report.after);
}
