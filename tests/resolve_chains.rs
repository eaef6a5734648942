use std::fs;
use std::path::Path;
use tiergraph::ingest::scan::ScanOptions;
use tiergraph::ingest::Ingestor;
use tiergraph::model::{ComponentKind, RelKind};
use tiergraph::store::Store;
use tiergraph::{chain, resolve};

const MAPPER_XML: &str = r#"<mapper namespace="orderMapper">
  <select id="selectOrders">
    SELECT O.ID, U.NAME FROM ORDERS O JOIN USERS U ON O.USER_ID = U.ID
  </select>
  <insert id="insertOrder">
    INSERT INTO ORDERS (ID, USER_ID) VALUES (#{id}, #{userId})
  </insert>
  <select id="selectDynamic">
    SELECT * FROM (SELECT * FROM AUDIT_LOG) t
  </select>
</mapper>
"#;

const CONTROLLER_JAVA: &str = r#"
@Controller
@RequestMapping("/orders")
public class OrderController {

    @GetMapping("")
    public String listOrders(Model model) {
        return orderDao.selectList("orderMapper.selectOrders");
    }

    @RequestMapping(value = "/save", method = RequestMethod.POST)
    public String saveOrder(OrderVO vo) {
        orderDao.insert("orderMapper.insertOrder");
        return "redirect:/orders";
    }

    @GetMapping("/audit")
    public String auditTrail() {
        return orderDao.selectList("orderMapper.selectDynamic");
    }
}
"#;

const PAGE_JSP: &str = r#"
<form action="/orders/save" method="post"></form>
<script>$.ajax({ url: "/orders" });</script>
"#;

fn analyze_fixture(root: &Path) -> Store {
    fs::create_dir_all(root.join("mappers")).unwrap();
    fs::create_dir_all(root.join("web")).unwrap();
    fs::write(root.join("mappers/order-mapper.xml"), MAPPER_XML).unwrap();
    fs::write(root.join("web/OrderController.java"), CONTROLLER_JAVA).unwrap();
    fs::write(root.join("web/orderList.jsp"), PAGE_JSP).unwrap();

    let store = Store::open(&root.join(".tiergraph/test.sqlite")).unwrap();
    let mut ingestor = Ingestor::new(
        store,
        "test",
        root.to_path_buf(),
        ScanOptions::default(),
        false,
    )
    .unwrap();
    ingestor.analyze().unwrap();
    ingestor.into_store()
}

fn table_edges(store: &Store, statement_name: &str, kind: &RelKind) -> Vec<String> {
    let statement = store.find_live_statement(statement_name).unwrap().unwrap();
    let mut names = Vec::new();
    for rel in store.live_relationships(Some(kind)).unwrap() {
        if rel.src_id != statement.component_id {
            continue;
        }
        let table = store.component_by_id(rel.dst_id).unwrap().unwrap();
        names.push(table.component_name);
    }
    names.sort();
    names
}

#[test]
fn resolver_materializes_table_edges_per_clause_kind() {
    let dir = tempfile::tempdir().unwrap();
    let store = analyze_fixture(dir.path());
    let stats = resolve::run(&store).unwrap();
    assert_eq!(stats.table_edges, 3);

    assert_eq!(
        table_edges(&store, "orderMapper.selectOrders", &RelKind::UsesTable),
        vec!["ORDERS"]
    );
    assert_eq!(
        table_edges(&store, "orderMapper.selectOrders", &RelKind::JoinsTable),
        vec!["USERS"]
    );
    assert_eq!(
        table_edges(&store, "orderMapper.insertOrder", &RelKind::UsesTable),
        vec!["ORDERS"]
    );
}

#[test]
fn resolver_never_fabricates_edges_for_opaque_statements() {
    let dir = tempfile::tempdir().unwrap();
    let store = analyze_fixture(dir.path());
    resolve::run(&store).unwrap();

    // The subquery-only statement yields nothing: unknown, not "no tables".
    assert!(table_edges(&store, "orderMapper.selectDynamic", &RelKind::UsesTable).is_empty());
    assert!(table_edges(&store, "orderMapper.selectDynamic", &RelKind::JoinsTable).is_empty());
    assert!(store
        .find_live_component(&ComponentKind::Table, "AUDIT_LOG")
        .unwrap()
        .is_none());
}

#[test]
fn resolver_links_endpoints_to_handler_methods() {
    let dir = tempfile::tempdir().unwrap();
    let store = analyze_fixture(dir.path());
    let stats = resolve::run(&store).unwrap();
    assert_eq!(stats.call_edges, 3);

    let endpoint = store
        .find_live_component(&ComponentKind::Endpoint, "/orders:GET")
        .unwrap()
        .unwrap();
    let edges = store
        .live_relationships(Some(&RelKind::CallsMethod))
        .unwrap();
    let edge = edges
        .iter()
        .find(|r| r.src_id == endpoint.component_id)
        .unwrap();
    let method = store.component_by_id(edge.dst_id).unwrap().unwrap();
    assert_eq!(method.component_name, "OrderController.listOrders");
}

#[test]
fn resolve_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = analyze_fixture(dir.path());
    resolve::run(&store).unwrap();
    let counts = store.live_counts().unwrap();
    resolve::run(&store).unwrap();
    assert_eq!(store.live_counts().unwrap(), counts);
}

#[test]
fn chain_report_walks_entry_to_tables() {
    let dir = tempfile::tempdir().unwrap();
    let store = analyze_fixture(dir.path());
    resolve::run(&store).unwrap();

    let rows = chain::chain_report(&store).unwrap();
    let row = rows
        .iter()
        .find(|r| r.entry_name == "/orders:GET")
        .unwrap();
    assert_eq!(row.class_name.as_deref(), Some("OrderController"));
    assert_eq!(row.method_name.as_deref(), Some("OrderController.listOrders"));
    assert_eq!(row.statement_name.as_deref(), Some("orderMapper.selectOrders"));
    assert_eq!(row.statement_kind.as_deref(), Some("sql-select"));
    assert_eq!(row.table_names, vec!["ORDERS", "USERS"]);
}

#[test]
fn chain_report_keeps_truncated_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = analyze_fixture(dir.path());
    resolve::run(&store).unwrap();

    // The opaque statement resolves no table: the row survives with an
    // empty set instead of vanishing.
    let rows = chain::chain_report(&store).unwrap();
    let row = rows
        .iter()
        .find(|r| r.entry_name == "/orders/audit:GET")
        .unwrap();
    assert_eq!(row.statement_name.as_deref(), Some("orderMapper.selectDynamic"));
    assert!(row.table_names.is_empty());
}

#[test]
fn chain_report_includes_page_entries_and_is_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let store = analyze_fixture(dir.path());
    resolve::run(&store).unwrap();

    let rows = chain::chain_report(&store).unwrap();
    let page_rows: Vec<_> = rows
        .iter()
        .filter(|r| r.entry_name == "web/orderList.jsp")
        .collect();
    assert_eq!(page_rows.len(), 2);
    assert_eq!(
        page_rows[0].method_name.as_deref(),
        Some("OrderController.listOrders")
    );
    assert_eq!(
        page_rows[1].method_name.as_deref(),
        Some("OrderController.saveOrder")
    );

    let mut sorted = rows.clone();
    sorted.sort_by(|a, b| {
        (&a.entry_name, &a.method_name, &a.statement_name)
            .cmp(&(&b.entry_name, &b.method_name, &b.statement_name))
    });
    assert_eq!(rows, sorted);

    // Same live graph, same report.
    assert_eq!(chain::chain_report(&store).unwrap(), rows);
}

#[test]
fn late_arriving_statement_target_is_linked_on_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("web")).unwrap();
    fs::write(
        root.join("web/OrderController.java"),
        r#"
@Controller
public class OrderController {
    @GetMapping("/orders")
    public String listOrders() {
        return orderDao.selectList("orderMapper.selectOrders");
    }
}
"#,
    )
    .unwrap();

    let store = Store::open(&root.join(".tiergraph/test.sqlite")).unwrap();
    let mut ingestor = Ingestor::new(
        store,
        "test",
        root.to_path_buf(),
        ScanOptions::default(),
        false,
    )
    .unwrap();

    // First run: the mapping file does not exist yet, so the call site has
    // no target to bind to.
    ingestor.analyze().unwrap();
    let stats = resolve::run(ingestor.store()).unwrap();
    assert_eq!(stats.symbol_edges, 0);
    assert!(ingestor
        .store()
        .live_relationships(Some(&RelKind::CallsQuery))
        .unwrap()
        .is_empty());

    // The mapper arrives later; the controller itself is unchanged and gets
    // hash-skipped, but the parked call site must still become an edge.
    fs::create_dir_all(root.join("mappers")).unwrap();
    fs::write(
        root.join("mappers/order-mapper.xml"),
        r#"<mapper namespace="orderMapper">
  <select id="selectOrders">SELECT * FROM ORDERS</select>
</mapper>
"#,
    )
    .unwrap();
    let (second, _) = ingestor.analyze().unwrap();
    assert_eq!(second.analyzed, 1);
    assert_eq!(second.skipped, 1);

    let store = ingestor.into_store();
    let stats = resolve::run(&store).unwrap();
    assert_eq!(stats.symbol_edges, 1);
    assert_eq!(
        store
            .live_relationships(Some(&RelKind::CallsQuery))
            .unwrap()
            .len(),
        1
    );

    // The healed edge flows straight through to the chain report.
    let rows = chain::chain_report(&store).unwrap();
    let row = rows
        .iter()
        .find(|r| r.entry_name == "/orders:GET")
        .unwrap();
    assert_eq!(row.statement_name.as_deref(), Some("orderMapper.selectOrders"));
    assert_eq!(row.table_names, vec!["ORDERS"]);

    // Once linked, the parked reference is gone; re-resolving is a no-op.
    let again = resolve::run(&store).unwrap();
    assert_eq!(again.symbol_edges, 0);
}

#[test]
fn minimal_fixture_yields_exactly_one_chain_row() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("mappers")).unwrap();
    fs::create_dir_all(root.join("web")).unwrap();
    fs::write(
        root.join("mappers/order-mapper.xml"),
        r#"<mapper namespace="orderMapper">
  <select id="selectOrders">SELECT * FROM ORDERS</select>
</mapper>
"#,
    )
    .unwrap();
    fs::write(
        root.join("web/OrderController.java"),
        r#"
@Controller
public class OrderController {
    @GetMapping("/orders")
    public String listOrders() {
        return orderDao.selectList("orderMapper.selectOrders");
    }
}
"#,
    )
    .unwrap();

    let store = Store::open(&root.join(".tiergraph/test.sqlite")).unwrap();
    let mut ingestor = Ingestor::new(
        store,
        "test",
        root.to_path_buf(),
        ScanOptions::default(),
        false,
    )
    .unwrap();
    ingestor.analyze().unwrap();
    let store = ingestor.into_store();
    resolve::run(&store).unwrap();

    let rows = chain::chain_report(&store).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entry_name, "/orders:GET");
    assert_eq!(rows[0].method_name.as_deref(), Some("OrderController.listOrders"));
    assert_eq!(rows[0].statement_name.as_deref(), Some("orderMapper.selectOrders"));
    assert_eq!(rows[0].table_names, vec!["ORDERS"]);
}

#[test]
fn root_path_endpoint_never_sources_a_call_edge() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("test.sqlite")).unwrap();
    let project_id = store.upsert_project("test", "/tmp/fixture").unwrap();
    let file_id = store
        .upsert_file(project_id, "web/Bad.java", "class-source", "h1")
        .unwrap();
    let unit = store
        .upsert_component(file_id, None, &ComponentKind::Unit, "Bad", "control")
        .unwrap();
    let method = store
        .upsert_component(
            file_id,
            Some(unit),
            &ComponentKind::Method,
            "Bad.handle",
            "control",
        )
        .unwrap();
    store
        .upsert_component(
            file_id,
            Some(method),
            &ComponentKind::Endpoint,
            "/:GET",
            "control",
        )
        .unwrap();

    let stats = resolve::run(&store).unwrap();
    assert_eq!(stats.call_edges, 0);
    assert!(store
        .live_relationships(Some(&RelKind::CallsMethod))
        .unwrap()
        .is_empty());
}

#[test]
fn parameterized_path_loses_to_literal_declaration() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("web")).unwrap();
    fs::write(
        root.join("web/DetailController.java"),
        r#"
@Controller
@RequestMapping("/items")
public class DetailController {
    @GetMapping("/detail")
    public String showDetail() { return "detail"; }
}
"#,
    )
    .unwrap();
    fs::write(
        root.join("web/GenericController.java"),
        r#"
@Controller
@RequestMapping("/items")
public class GenericController {
    @GetMapping("/{id}")
    public String showById() { return "generic"; }
}
"#,
    )
    .unwrap();

    let store = Store::open(&root.join(".tiergraph/test.sqlite")).unwrap();
    let mut ingestor = Ingestor::new(
        store,
        "test",
        root.to_path_buf(),
        ScanOptions::default(),
        false,
    )
    .unwrap();
    ingestor.analyze().unwrap();
    let store = ingestor.into_store();
    resolve::run(&store).unwrap();

    let edges = store
        .live_relationships(Some(&RelKind::CallsMethod))
        .unwrap();
    assert_eq!(edges.len(), 1);
    let endpoint = store
        .component_by_id(edges[0].src_id)
        .unwrap()
        .unwrap();
    assert_eq!(endpoint.component_name, "/items/detail:GET");
}
