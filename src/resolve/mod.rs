use crate::model::{Component, ComponentKind, RelKind};
use crate::store::Store;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub mod tables;

#[derive(Debug, Default, Serialize)]
pub struct ResolveStats {
    pub symbol_edges: usize,
    pub table_edges: usize,
    pub call_edges: usize,
}

/// Derives the cross-file edges no single-file extractor can know. Runs
/// after ingestion so its view of "all facts so far" is the committed store.
///
/// Parked symbolic references go first: a call site committed before its
/// target file existed becomes a live edge here, and the table pass then
/// sees it in the same run.
pub fn run(store: &Store) -> Result<ResolveStats> {
    let symbol_edges = store.resolve_pending_refs()?;
    Ok(ResolveStats {
        symbol_edges,
        table_edges: resolve_tables(store)?,
        call_edges: resolve_endpoints(store)?,
    })
}

/// Statement -> table pass: for every live calls-query edge, pattern-match
/// the statement's literal text and materialize uses-table /
/// query-joins-table edges. Unmatched clauses produce no edge; that absence
/// means "unknown", never "no dependency".
pub fn resolve_tables(store: &Store) -> Result<usize> {
    let mut created = 0;
    for rel in store.live_relationships(Some(&RelKind::CallsQuery))? {
        let Some(statement) = store.component_by_id(rel.dst_id)? else {
            continue;
        };
        if !statement.kind().is_sql_statement() {
            continue;
        }
        let Some(content) = store.get_sql_content(statement.component_id)? else {
            debug!(statement = %statement.component_name, "no sql body, skipping");
            continue;
        };
        let refs = tables::extract_table_refs(&content.sql_text);
        for name in &refs.used {
            let table_id = store.ensure_table_component(name, statement.file_id)?;
            store.upsert_relationship(statement.component_id, table_id, &RelKind::UsesTable)?;
            created += 1;
        }
        for name in &refs.joined {
            let table_id = store.ensure_table_component(name, statement.file_id)?;
            store.upsert_relationship(statement.component_id, table_id, &RelKind::JoinsTable)?;
            created += 1;
        }
    }
    Ok(created)
}

/// Endpoint -> method pass. Endpoints carry their handler as `parent_id`;
/// this pass filters out malformed endpoint values, picks the most specific
/// handler per path+verb, and materializes one calls-method edge per group.
pub fn resolve_endpoints(store: &Store) -> Result<usize> {
    let endpoints = store.live_components(Some(&ComponentKind::Endpoint))?;

    // Candidates grouped by exact path+verb; duplicate declarations across
    // files land in the same group.
    let mut groups: BTreeMap<String, Vec<(Component, Component)>> = BTreeMap::new();
    let mut literal_names: Vec<String> = Vec::new();
    for endpoint in endpoints {
        let (path, verb) = split_endpoint_name(&endpoint.component_name);
        if is_rejected_endpoint_path(path) {
            // Failed upstream path extraction, not a real endpoint.
            warn!(endpoint = %endpoint.component_name, "malformed endpoint, never a call source");
            continue;
        }
        let Some(parent_id) = endpoint.parent_id else {
            continue;
        };
        let Some(method) = store.component_by_id(parent_id)? else {
            continue;
        };
        if method.deleted || method.kind() != ComponentKind::Method {
            continue;
        }
        if !has_param_segment(path) {
            literal_names.push(format!("{path}:{verb}"));
        }
        groups
            .entry(endpoint.component_name.clone())
            .or_default()
            .push((endpoint, method));
    }

    let mut created = 0;
    for (name, candidates) in groups {
        let (path, verb) = split_endpoint_name(&name);
        // A parameterized path loses to a literal declaration that serves
        // the same requests: most specific handler wins.
        if has_param_segment(path) {
            let shadowed = literal_names.iter().any(|literal| {
                let (lpath, lverb) = split_endpoint_name(literal);
                lverb == verb && shape_matches(path, lpath)
            });
            if shadowed {
                debug!(endpoint = %name, "shadowed by a literal-segment declaration");
                continue;
            }
        }
        let Some(picked) = candidates
            .iter()
            .min_by(|(_, a), (_, b)| a.component_name.cmp(&b.component_name))
        else {
            continue;
        };
        if candidates.len() > 1 {
            warn!(
                endpoint = %name,
                method = %picked.1.component_name,
                "duplicate handler candidates, resolved to first by name"
            );
        }
        store.upsert_relationship(
            picked.0.component_id,
            picked.1.component_id,
            &RelKind::CallsMethod,
        )?;
        created += 1;
    }
    Ok(created)
}

/// Does a parameterized path template accept the given literal path?
fn shape_matches(template: &str, literal: &str) -> bool {
    let tsegs: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    let lsegs: Vec<&str> = literal.split('/').filter(|s| !s.is_empty()).collect();
    if tsegs.len() != lsegs.len() {
        return false;
    }
    tsegs
        .iter()
        .zip(&lsegs)
        .all(|(t, l)| is_param_segment(t) || t == l)
}

/// Endpoint component names encode the verb as a `path:VERB` suffix.
pub fn split_endpoint_name(name: &str) -> (&str, &str) {
    match name.rsplit_once(':') {
        Some((path, verb)) => (path, verb),
        None => (name, ""),
    }
}

/// Reject patterns for endpoint-path values: exactly `/`, the empty string,
/// or a bare parameter token with no literal segment. These signal a failed
/// extraction heuristic upstream and must never source a call edge.
pub fn is_rejected_endpoint_path(path: &str) -> bool {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return true;
    }
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return true;
    }
    segments.iter().all(|s| is_param_segment(s))
}

fn has_param_segment(path: &str) -> bool {
    path.split('/').any(|s| !s.is_empty() && is_param_segment(s))
}

fn is_param_segment(segment: &str) -> bool {
    segment == "*"
        || segment.starts_with(':')
        || (segment.starts_with('{') && segment.ends_with('}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_patterns() {
        assert!(is_rejected_endpoint_path("/"));
        assert!(is_rejected_endpoint_path(""));
        assert!(is_rejected_endpoint_path("{id}"));
        assert!(is_rejected_endpoint_path("/{id}"));
        assert!(is_rejected_endpoint_path("/{a}/{b}"));
        assert!(!is_rejected_endpoint_path("/orders"));
        assert!(!is_rejected_endpoint_path("/orders/{id}"));
    }

    #[test]
    fn endpoint_name_split() {
        assert_eq!(split_endpoint_name("/orders:GET"), ("/orders", "GET"));
        assert_eq!(split_endpoint_name("/orders"), ("/orders", ""));
    }

    #[test]
    fn literal_paths_match_param_templates() {
        assert!(shape_matches("/orders/{id}", "/orders/detail"));
        assert!(shape_matches("/orders/:id", "/orders/detail"));
        assert!(!shape_matches("/orders/{id}", "/orders"));
        assert!(!shape_matches("/users/{id}", "/orders/detail"));
    }
}
