//! Joint Record/Node Links
//!
//! Attaching a record to a concept node touches both stores: the node gains
//! a memory summary, the record gains a back-reference. Both writes happen
//! under both write leases before either lock is released, so readers never
//! observe a half-applied link (back-reference completeness).

use thiserror::Error;

use crate::graph::{GraphError, GraphStore, MemorySummary, NodeId};
use crate::store::error::StoreError;
use crate::store::record::{truncate_chars, RecordId};
use crate::store::RecordStore;

/// Errors from joint link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Record store failure
    #[error("record store: {0}")]
    Store(#[from] StoreError),

    /// Concept graph failure
    #[error("concept graph: {0}")]
    Graph(#[from] GraphError),
}

/// Attach a record to a node. Idempotent on the pair; returns whether a new
/// link was created.
///
/// # Errors
/// `NotFound` when either end is missing; storage errors otherwise.
pub fn attach_record(
    graph: &GraphStore,
    store: &RecordStore,
    node_id: &NodeId,
    record_id: &RecordId,
    summary: Option<&str>,
) -> Result<bool, LinkError> {
    let meta = store
        .get_meta(record_id)
        .ok_or_else(|| StoreError::not_found(record_id.as_str()))?;

    let summary_text = match summary {
        Some(text) => text.to_string(),
        None => truncate_chars(&meta.preview, 100),
    };
    let added = graph.attach_summary(
        node_id,
        MemorySummary {
            record_id: record_id.as_str().to_string(),
            path: meta.rel_path.clone(),
            summary: summary_text,
            tier: meta.tier,
            value_level: meta.value_level(),
            confidence: meta.confidence,
        },
    )?;

    let mut refs = meta.nng_refs;
    if refs.insert(node_id.as_str().to_string()) || added {
        if let Err(error) = store.set_nng_refs(record_id, refs) {
            // The summary landed but the back-reference did not: undo the
            // summary so no half-applied link survives, and schedule a
            // consistency sweep in case the undo itself fails.
            let _ = graph.detach_summary(node_id, record_id.as_str());
            store.request_sweep();
            return Err(StoreError::integrity(format!(
                "attach of {record_id} to {node_id} rolled back: {error}"
            ))
            .into());
        }
    }
    Ok(added)
}

/// Cross-store invariant checks: back-reference completeness in both
/// directions, and the tier-0 connectivity rule (every meta-cognitive
/// record must reach an integrated record through a node or an
/// association edge).
#[must_use]
pub fn verify_links(graph: &GraphStore, store: &RecordStore) -> Vec<String> {
    use crate::store::record::Tier;
    use crate::store::RecordFilter;

    let mut issues = Vec::new();

    for meta in store.list(&RecordFilter::new()) {
        for node_ref in &meta.nng_refs {
            match NodeId::parse(node_ref).ok().map(|id| graph.read_node(&id)) {
                Some(Ok(node)) => {
                    if !node
                        .memory_summaries
                        .iter()
                        .any(|s| s.record_id == meta.id.as_str())
                    {
                        issues.push(format!(
                            "record {} references node {node_ref} without a summary entry",
                            meta.id
                        ));
                    }
                }
                _ => issues.push(format!("record {} references missing node {node_ref}", meta.id)),
            }
        }
    }

    for node in graph.all_nodes() {
        for summary in &node.memory_summaries {
            let known = RecordId::parse(&summary.record_id)
                .ok()
                .and_then(|id| store.get_meta(&id))
                .is_some_and(|meta| meta.nng_refs.contains(node.id.as_str()));
            if !known {
                issues.push(format!(
                    "node {} lists record {} without a back-reference",
                    node.id, summary.record_id
                ));
            }
        }
    }

    // No orphaned core memories: a tier-0 record must sit next to at least
    // one tier-1 record, via a shared node or an association edge.
    for meta in store.list(&RecordFilter::new().with_tier(Tier::MetaCognitive)) {
        let via_node = meta.nng_refs.iter().any(|node_ref| {
            NodeId::parse(node_ref)
                .ok()
                .and_then(|id| graph.read_node(&id).ok())
                .is_some_and(|node| {
                    node.memory_summaries
                        .iter()
                        .any(|s| s.tier == Tier::Integrated)
                })
        });
        let via_edge = store.association_neighbors(&meta.id).iter().any(|target| {
            RecordId::parse(target)
                .ok()
                .and_then(|id| store.get_meta(&id))
                .is_some_and(|m| m.tier == Tier::Integrated)
        });
        if !via_node && !via_edge {
            issues.push(format!(
                "tier-0 record {} has no link to any integrated record",
                meta.id
            ));
        }
    }

    issues
}

/// Detach a record from a node. Idempotent; returns whether a link existed.
///
/// # Errors
/// `NotFound` when the node is missing; storage errors otherwise.
pub fn detach_record(
    graph: &GraphStore,
    store: &RecordStore,
    node_id: &NodeId,
    record_id: &RecordId,
) -> Result<bool, LinkError> {
    let removed = graph.detach_summary(node_id, record_id.as_str())?;

    if let Some(meta) = store.get_meta(record_id) {
        let mut refs = meta.nng_refs;
        if refs.remove(node_id.as_str()) {
            store.set_nng_refs(record_id, refs)?;
        }
    }
    Ok(removed)
}

/// Delete a record along with every node link pointing at it.
///
/// # Errors
/// `NotFound` when the record is missing; storage errors otherwise.
pub fn delete_record(
    graph: &GraphStore,
    store: &RecordStore,
    record_id: &RecordId,
) -> Result<(), LinkError> {
    for node_id in graph.nodes_referencing(record_id.as_str()) {
        graph.detach_summary(&node_id, record_id.as_str())?;
    }
    store.delete(record_id)?;
    Ok(())
}
