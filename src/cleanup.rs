//! Graph hygiene pass: retire endpoint components whose path value matches a
//! reject pattern, together with every edge touching them.
//!
//! Malformed endpoints come from extraction heuristics that failed to recover
//! a path (a bare `/`, an empty value, a lone parameter token). They can
//! never source a real call edge, so keeping them only pollutes chain output.
//! The pass is scan-then-commit: candidates are collected from a read
//! snapshot, then soft-deleted in one transaction. Must not run concurrently
//! with an ingestion pass over the same store.

use crate::model::{CleanupReport, ComponentKind};
use crate::resolve;
use crate::store::Store;
use anyhow::Result;
use tracing::{debug, info};

pub fn run(store: &Store) -> Result<CleanupReport> {
    let before = store.live_counts()?;

    let endpoints = store.live_components(Some(&ComponentKind::Endpoint))?;
    let scanned_endpoints = endpoints.len() as i64;
    let mut candidates = Vec::new();
    for endpoint in endpoints {
        let (path, _) = resolve::split_endpoint_name(&endpoint.component_name);
        if resolve::is_rejected_endpoint_path(path) {
            debug!(endpoint = %endpoint.component_name, "malformed endpoint marked for removal");
            candidates.push(endpoint.component_id);
        }
    }

    let (removed_components, removed_relationships) =
        store.soft_delete_components_cascade(&candidates)?;
    let after = store.live_counts()?;

    info!(
        scanned = scanned_endpoints,
        removed_components, removed_relationships, "cleanup pass complete"
    );
    Ok(CleanupReport {
        scanned_endpoints,
        removed_components,
        removed_relationships,
        before,
        after,
    })
}
