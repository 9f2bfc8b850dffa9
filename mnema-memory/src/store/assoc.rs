//! Association Edges
//!
//! Cross-links between records live in an adjacency map separate from the
//! concept tree. Relation is an opaque free-text tag plus a weight in [0,1].
//! Traversal is iterative with a visited set; when one traversal finds more
//! than one back-edge, the weakest is marked and dropped by the next
//! maintenance run, never synchronously.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{StoreError, StoreResult};
use crate::constants::{
    ASSOCIATION_TRAVERSAL_DEPTH_MAX, ASSOCIATION_WEIGHT_MAX, ASSOCIATION_WEIGHT_MIN,
};

/// A directed association edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationEdge {
    /// Opaque relation label
    pub relation: String,
    /// Edge weight in [0, 1]
    pub weight: f64,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
}

/// A record reached by association traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedRecord {
    /// Target record id
    pub record_id: String,
    /// Relation of the edge that reached it first
    pub relation: String,
    /// Weight of that edge
    pub weight: f64,
    /// Hops from the start record
    pub depth: usize,
}

/// Adjacency map of association edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssociationMap {
    /// source id → target id → edge
    edges: BTreeMap<String, BTreeMap<String, AssociationEdge>>,
    /// Edges marked by cycle detection, dropped on the next maintenance run
    #[serde(default)]
    prune_queue: BTreeSet<(String, String)>,
}

impl AssociationMap {
    /// Insert (or overwrite) an edge.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the weight is outside [0, 1].
    pub fn insert(
        &mut self,
        source: &str,
        target: &str,
        relation: impl Into<String>,
        weight: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !(ASSOCIATION_WEIGHT_MIN..=ASSOCIATION_WEIGHT_MAX).contains(&weight) {
            return Err(StoreError::invalid_input(format!(
                "association weight must be in [0, 1]: got {weight}"
            )));
        }
        if source == target {
            return Err(StoreError::invalid_input("self-association"));
        }

        self.edges.entry(source.to_string()).or_default().insert(
            target.to_string(),
            AssociationEdge {
                relation: relation.into(),
                weight,
                created_at: at,
            },
        );
        Ok(())
    }

    /// Remove every edge touching `record_id`.
    pub fn remove_record(&mut self, record_id: &str) {
        self.edges.remove(record_id);
        self.edges.retain(|_, targets| {
            targets.remove(record_id);
            !targets.is_empty()
        });
        self.prune_queue
            .retain(|(s, t)| s != record_id && t != record_id);
    }

    /// Outgoing edges of a record.
    #[must_use]
    pub fn neighbors(&self, record_id: &str) -> Vec<(&str, &AssociationEdge)> {
        self.edges
            .get(record_id)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(id, edge)| (id.as_str(), edge))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    /// Breadth-first traversal from `start` up to `max_depth` hops.
    ///
    /// Detects back-edges (edges into already-visited records). If more than
    /// one is found, the weakest joins the prune queue for the next
    /// maintenance run.
    pub fn traverse(&mut self, start: &str, max_depth: Option<usize>) -> Vec<RelatedRecord> {
        let max_depth = max_depth.unwrap_or(ASSOCIATION_TRAVERSAL_DEPTH_MAX);

        let mut related = Vec::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut back_edges: Vec<(String, String, f64)> = Vec::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();

        visited.insert(start.to_string());
        queue.push_back((start.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(targets) = self.edges.get(&current) else {
                continue;
            };
            for (target, edge) in targets {
                if visited.contains(target) {
                    back_edges.push((current.clone(), target.clone(), edge.weight));
                    continue;
                }
                visited.insert(target.clone());
                related.push(RelatedRecord {
                    record_id: target.clone(),
                    relation: edge.relation.clone(),
                    weight: edge.weight,
                    depth: depth + 1,
                });
                queue.push_back((target.clone(), depth + 1));
            }
        }

        if back_edges.len() > 1 {
            if let Some((source, target, _)) = back_edges
                .iter()
                .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
            {
                self.prune_queue.insert((source.clone(), target.clone()));
            }
        }

        related
    }

    /// Edges currently queued for pruning.
    #[must_use]
    pub fn prune_queue_len(&self) -> usize {
        self.prune_queue.len()
    }

    /// Drop every queued edge. Returns how many were removed.
    pub fn apply_pruning(&mut self) -> usize {
        let queued: Vec<(String, String)> = self.prune_queue.iter().cloned().collect();
        self.prune_queue.clear();

        let mut removed = 0;
        for (source, target) in queued {
            if let Some(targets) = self.edges.get_mut(&source) {
                if targets.remove(&target).is_some() {
                    removed += 1;
                }
                if targets.is_empty() {
                    self.edges.remove(&source);
                }
            }
        }
        removed
    }
}
