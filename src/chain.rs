//! Call-chain reports: entry point -> handler method -> statement -> tables.
//!
//! Traversal is tolerant. A missing hop truncates the row with `None` fields
//! or an empty table set but never drops it, so a chain report always shows
//! where coverage ends instead of hiding the entry.

use crate::model::{ChainRow, Component, ComponentKind, RelKind};
use crate::resolve;
use crate::store::Store;
use anyhow::Result;
use std::collections::{BTreeSet, HashMap};

/// Builds the full chain report over the live graph. One store pass loads
/// components and edges; everything after is in-memory traversal.
pub fn chain_report(store: &Store) -> Result<Vec<ChainRow>> {
    let components: HashMap<i64, Component> = store
        .live_components(None)?
        .into_iter()
        .map(|c| (c.component_id, c))
        .collect();

    let mut calls_method: HashMap<i64, i64> = HashMap::new();
    let mut page_calls: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut calls_query: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut tables: HashMap<i64, BTreeSet<String>> = HashMap::new();

    for rel in store.live_relationships(None)? {
        match RelKind::parse(&rel.rel_type) {
            RelKind::CallsMethod => {
                calls_method.entry(rel.src_id).or_insert(rel.dst_id);
            }
            RelKind::PageCall => page_calls.entry(rel.src_id).or_default().push(rel.dst_id),
            RelKind::CallsQuery => calls_query.entry(rel.src_id).or_default().push(rel.dst_id),
            RelKind::UsesTable | RelKind::JoinsTable | RelKind::ReferencesTable => {
                if let Some(table) = components.get(&rel.dst_id) {
                    tables
                        .entry(rel.src_id)
                        .or_default()
                        .insert(table.component_name.clone());
                }
            }
            _ => {}
        }
    }

    let graph = Graph {
        components: &components,
        calls_method: &calls_method,
        calls_query: &calls_query,
        tables: &tables,
    };

    let mut rows: Vec<ChainRow> = Vec::new();

    // Endpoint entries: every live, well-formed endpoint is a chain entry,
    // linked or not.
    for comp in components.values() {
        if comp.kind() != ComponentKind::Endpoint {
            continue;
        }
        let (path, _) = resolve::split_endpoint_name(&comp.component_name);
        if resolve::is_rejected_endpoint_path(path) {
            continue;
        }
        graph.rows_from_endpoint(&comp.component_name, comp.component_id, &mut rows);
    }

    // Page entries: a presentation unit with page-call edges chains through
    // each endpoint it targets.
    for (unit_id, endpoint_ids) in &page_calls {
        let Some(unit) = components.get(unit_id) else {
            continue;
        };
        if unit.kind() != ComponentKind::Unit {
            continue;
        }
        for endpoint_id in endpoint_ids {
            graph.rows_from_endpoint(&unit.component_name, *endpoint_id, &mut rows);
        }
    }

    rows.sort_by(|a, b| {
        (&a.entry_name, &a.method_name, &a.statement_name)
            .cmp(&(&b.entry_name, &b.method_name, &b.statement_name))
    });
    rows.dedup();
    Ok(rows)
}

struct Graph<'a> {
    components: &'a HashMap<i64, Component>,
    calls_method: &'a HashMap<i64, i64>,
    calls_query: &'a HashMap<i64, Vec<i64>>,
    tables: &'a HashMap<i64, BTreeSet<String>>,
}

impl Graph<'_> {
    /// Emits every chain row reachable from one endpoint, labelled with the
    /// given entry name (the endpoint itself, or the page that targets it).
    fn rows_from_endpoint(&self, entry_name: &str, endpoint_id: i64, rows: &mut Vec<ChainRow>) {
        let method = self
            .calls_method
            .get(&endpoint_id)
            .and_then(|id| self.components.get(id));
        let Some(method) = method else {
            rows.push(truncated_row(entry_name, None, None));
            return;
        };
        let class_name = method
            .parent_id
            .and_then(|id| self.components.get(&id))
            .map(|unit| unit.component_name.clone());

        let statements: Vec<&Component> = self
            .calls_query
            .get(&method.component_id)
            .map(|ids| ids.iter().filter_map(|id| self.components.get(id)).collect())
            .unwrap_or_default();
        if statements.is_empty() {
            rows.push(truncated_row(
                entry_name,
                class_name,
                Some(method.component_name.clone()),
            ));
            return;
        }

        for statement in statements {
            let table_names = self
                .tables
                .get(&statement.component_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            rows.push(ChainRow {
                entry_name: entry_name.to_string(),
                class_name: class_name.clone(),
                method_name: Some(method.component_name.clone()),
                statement_name: Some(statement.component_name.clone()),
                statement_kind: Some(statement.component_type.clone()),
                table_names,
            });
        }
    }
}

fn truncated_row(
    entry_name: &str,
    class_name: Option<String>,
    method_name: Option<String>,
) -> ChainRow {
    ChainRow {
        entry_name: entry_name.to_string(),
        class_name,
        method_name,
        statement_name: None,
        statement_kind: None,
        table_names: Vec::new(),
    }
}
