//! Concept Graph Store
//!
//! Owns the concept navigation graph: path-addressed node documents under
//! `graph/`, plus `root.json` listing the depth-1 nodes. Path invariants are
//! enforced at write time; when they cannot be preserved the operation fails
//! without partial mutation.

pub mod error;
pub mod node;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use mnema_core::sim::FaultInjector;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::clock::Clock;
use crate::constants::GRAPH_DEPTH_COUNT_MAX;
use crate::journal::{Journal, JournalKind};
use crate::store::record::clamp_confidence;

pub use self::error::{GraphError, GraphResult};
pub use self::node::{ConceptNode, MemorySummary, NodeId, NodePatch, NodeRef};

// =============================================================================
// Root Document
// =============================================================================

/// `graph/root.json`: the depth-1 listing plus one update stamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootDoc {
    /// Ids of all depth-1 nodes
    pub top_level: Vec<String>,
    /// Last structural change
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: BTreeMap<String, ConceptNode>,
    root: RootDoc,
}

// =============================================================================
// GraphStore
// =============================================================================

/// Path-addressed storage of concept nodes.
pub struct GraphStore {
    root_dir: PathBuf,
    graph_dir: PathBuf,
    clock: Clock,
    journal: Arc<Journal>,
    inner: RwLock<GraphInner>,
    faults: Option<Arc<FaultInjector>>,
}

impl GraphStore {
    /// Open the graph under `root/graph`, creating it on first run.
    ///
    /// A corrupt `root.json` installs a fresh empty graph and logs the
    /// failure; corrupt node documents are skipped individually.
    ///
    /// # Errors
    /// Returns `Storage` if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>, clock: Clock, journal: Arc<Journal>) -> GraphResult<Self> {
        let root_dir = root.into();
        let graph_dir = root_dir.join("graph");
        fs::create_dir_all(&graph_dir)?;

        let store = Self {
            root_dir,
            graph_dir,
            clock,
            journal,
            inner: RwLock::new(GraphInner::default()),
            faults: None,
        };

        let mut inner = GraphInner {
            root: store.load_root(),
            nodes: BTreeMap::new(),
        };
        store.load_nodes(&store.graph_dir.clone(), &mut inner.nodes);
        *store.inner.write().unwrap() = inner;

        store.ensure_root_file()?;
        Ok(store)
    }

    /// Attach a fault injector (operation name: `graph_write`).
    #[must_use]
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a node.
    ///
    /// # Errors
    /// `NotFound` if absent.
    pub fn read_node(&self, id: &NodeId) -> GraphResult<ConceptNode> {
        self.inner
            .read()
            .unwrap()
            .nodes
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| GraphError::not_found(id.as_str()))
    }

    /// Whether a node exists.
    #[must_use]
    pub fn exists(&self, id: &NodeId) -> bool {
        self.inner.read().unwrap().nodes.contains_key(id.as_str())
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.read().unwrap().nodes.len()
    }

    /// The root listing.
    #[must_use]
    pub fn root_doc(&self) -> RootDoc {
        self.inner.read().unwrap().root.clone()
    }

    /// All nodes, ordered by id.
    #[must_use]
    pub fn all_nodes(&self) -> Vec<ConceptNode> {
        self.inner.read().unwrap().nodes.values().cloned().collect()
    }

    /// Child references of a node.
    ///
    /// # Errors
    /// `NotFound` if absent.
    pub fn children(&self, id: &NodeId) -> GraphResult<Vec<NodeRef>> {
        Ok(self.read_node(id)?.child_refs)
    }

    /// Existing ancestors of a node, outermost first.
    #[must_use]
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let inner = self.inner.read().unwrap();
        id.ancestors()
            .into_iter()
            .filter(|a| inner.nodes.contains_key(a.as_str()))
            .collect()
    }

    /// Nodes whose summaries reference the given record.
    #[must_use]
    pub fn nodes_referencing(&self, record_id: &str) -> Vec<NodeId> {
        self.inner
            .read()
            .unwrap()
            .nodes
            .values()
            .filter(|node| {
                node.memory_summaries
                    .iter()
                    .any(|s| s.record_id == record_id)
            })
            .map(|node| node.id.clone())
            .collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Create a node under `parent` (or at the top level for `None`),
    /// allocating the next free child index.
    ///
    /// Updates the parent's `child_refs` and the root listing atomically with
    /// the node itself: any write failure rolls the whole create back.
    ///
    /// # Errors
    /// `ParentNotFound`, `TooDeep`, or `Storage`.
    #[tracing::instrument(skip(self, content))]
    pub fn create_node(
        &self,
        parent: Option<&NodeId>,
        content: impl Into<String>,
        confidence: u8,
    ) -> GraphResult<NodeId> {
        let content = content.into();
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();

        let (id, parent_refs) = match parent {
            None => {
                let next = inner
                    .root
                    .top_level
                    .iter()
                    .filter_map(|s| s.parse::<u32>().ok())
                    .max()
                    .unwrap_or(0)
                    + 1;
                (NodeId::top_level(next), Vec::new())
            }
            Some(parent_id) => {
                let parent_node = inner
                    .nodes
                    .get(parent_id.as_str())
                    .ok_or_else(|| GraphError::parent_not_found(parent_id.as_str()))?;
                let depth = parent_id.depth() + 1;
                if depth > GRAPH_DEPTH_COUNT_MAX {
                    return Err(GraphError::TooDeep { depth });
                }
                (
                    parent_id.child(parent_node.next_child_index()),
                    vec![NodeRef::to(parent_id)],
                )
            }
        };

        let node = ConceptNode {
            id: id.clone(),
            content,
            confidence: clamp_confidence(i64::from(confidence)),
            created_at: now,
            updated_at: now,
            parent_refs,
            child_refs: Vec::new(),
            memory_summaries: Vec::new(),
        };

        self.write_node_file(&node)?;

        if let Some(parent_id) = parent {
            let parent_node = inner
                .nodes
                .get_mut(parent_id.as_str())
                .expect("checked above");
            parent_node.child_refs.push(NodeRef::to(&id));
            parent_node.updated_at = now;
            let parent_clone = parent_node.clone();
            if let Err(error) = self.write_node_file(&parent_clone) {
                // Roll back: the child file must not outlive the failed link.
                inner
                    .nodes
                    .get_mut(parent_id.as_str())
                    .expect("checked above")
                    .child_refs
                    .retain(|r| r.node_id != id.as_str());
                let _ = fs::remove_file(self.root_dir.join(id.rel_path()));
                return Err(error);
            }
        } else {
            inner.root.top_level.push(id.as_str().to_string());
            inner.root.updated_at = Some(now);
            let root_clone = inner.root.clone();
            if let Err(error) = self.write_root_file(&root_clone) {
                inner.root.top_level.retain(|s| s != id.as_str());
                let _ = fs::remove_file(self.root_dir.join(id.rel_path()));
                return Err(error);
            }
        }

        inner.nodes.insert(id.as_str().to_string(), node);
        self.journal
            .append(JournalKind::Create, json!({"node_id": id.as_str()}));
        Ok(id)
    }

    /// Update a node's content and/or confidence, re-stamping `updated_at`.
    ///
    /// # Errors
    /// `NotFound` or `Storage`.
    pub fn update_node(&self, id: &NodeId, patch: NodePatch) -> GraphResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();
        let node = inner
            .nodes
            .get_mut(id.as_str())
            .ok_or_else(|| GraphError::not_found(id.as_str()))?;

        if let Some(content) = patch.content {
            node.content = content;
        }
        if let Some(confidence) = patch.confidence {
            node.confidence = clamp_confidence(i64::from(confidence));
        }
        node.updated_at = now;
        let clone = node.clone();
        self.write_node_file(&clone)?;

        self.journal
            .append(JournalKind::Update, json!({"node_id": id.as_str()}));
        Ok(())
    }

    /// Delete a node. Allowed only when it has no children and no summaries;
    /// cascades removal from the parent's `child_refs` and the root listing.
    ///
    /// # Errors
    /// `NotFound`, `NotEmpty`, or `Storage`.
    pub fn delete_node(&self, id: &NodeId) -> GraphResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();
        let node = inner
            .nodes
            .get(id.as_str())
            .ok_or_else(|| GraphError::not_found(id.as_str()))?;
        if !node.is_empty() {
            return Err(GraphError::NotEmpty {
                id: id.as_str().to_string(),
            });
        }

        if let Some(parent_id) = id.parent() {
            if let Some(parent_node) = inner.nodes.get_mut(parent_id.as_str()) {
                parent_node.child_refs.retain(|r| r.node_id != id.as_str());
                parent_node.updated_at = now;
                let clone = parent_node.clone();
                self.write_node_file(&clone)?;
            }
        } else {
            inner.root.top_level.retain(|s| s != id.as_str());
            inner.root.updated_at = Some(now);
            let root_clone = inner.root.clone();
            self.write_root_file(&root_clone)?;
        }

        let _ = fs::remove_file(self.root_dir.join(id.rel_path()));
        inner.nodes.remove(id.as_str());

        self.journal
            .append(JournalKind::Delete, json!({"node_id": id.as_str()}));
        Ok(())
    }

    /// Add a record summary to a node. Idempotent on the (node, record)
    /// pair: returns `false` when the entry already existed.
    ///
    /// # Errors
    /// `NotFound` or `Storage`.
    pub fn attach_summary(&self, id: &NodeId, summary: MemorySummary) -> GraphResult<bool> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();
        let node = inner
            .nodes
            .get_mut(id.as_str())
            .ok_or_else(|| GraphError::not_found(id.as_str()))?;

        if node
            .memory_summaries
            .iter()
            .any(|s| s.record_id == summary.record_id)
        {
            return Ok(false);
        }

        let record_id = summary.record_id.clone();
        node.memory_summaries.push(summary);
        node.updated_at = now;
        let clone = node.clone();
        self.write_node_file(&clone)?;

        self.journal.append(
            JournalKind::Attach,
            json!({"node_id": id.as_str(), "record_id": record_id}),
        );
        Ok(true)
    }

    /// Remove a record summary from a node. Idempotent: returns `false`
    /// when no entry was present.
    ///
    /// # Errors
    /// `NotFound` or `Storage`.
    pub fn detach_summary(&self, id: &NodeId, record_id: &str) -> GraphResult<bool> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();
        let node = inner
            .nodes
            .get_mut(id.as_str())
            .ok_or_else(|| GraphError::not_found(id.as_str()))?;

        let before = node.memory_summaries.len();
        node.memory_summaries.retain(|s| s.record_id != record_id);
        if node.memory_summaries.len() == before {
            return Ok(false);
        }
        node.updated_at = now;
        let clone = node.clone();
        self.write_node_file(&clone)?;

        self.journal.append(
            JournalKind::Detach,
            json!({"node_id": id.as_str(), "record_id": record_id}),
        );
        Ok(true)
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Check path-prefix completeness: every node's parent exists and lists
    /// it; the root lists exactly the depth-1 nodes.
    #[must_use]
    pub fn verify_consistency(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut issues = Vec::new();

        for node in inner.nodes.values() {
            if let Some(parent_id) = node.id.parent() {
                match inner.nodes.get(parent_id.as_str()) {
                    None => issues.push(format!("node {} has no parent node", node.id)),
                    Some(parent) => {
                        if !parent.child_refs.iter().any(|r| r.node_id == node.id.as_str()) {
                            issues.push(format!(
                                "parent {} does not list child {}",
                                parent_id, node.id
                            ));
                        }
                    }
                }
            } else if !inner.root.top_level.contains(&node.id.as_str().to_string()) {
                issues.push(format!("root listing missing depth-1 node {}", node.id));
            }
        }
        for listed in &inner.root.top_level {
            if !inner.nodes.contains_key(listed) {
                issues.push(format!("root lists missing node {listed}"));
            }
        }
        issues
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn load_root(&self) -> RootDoc {
        let path = self.graph_dir.join("root.json");
        let Ok(text) = fs::read_to_string(&path) else {
            return RootDoc::default();
        };
        match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "root.json corrupt, installing fresh graph");
                RootDoc::default()
            }
        }
    }

    fn load_nodes(&self, dir: &Path, nodes: &mut BTreeMap<String, ConceptNode>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.load_nodes(&path, nodes);
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some("root.json") {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(GraphError::from)
                .and_then(|text| serde_json::from_str::<ConceptNode>(&text).map_err(GraphError::from))
            {
                Ok(node) => {
                    nodes.insert(node.id.as_str().to_string(), node);
                }
                Err(error) => {
                    tracing::error!(path = %path.display(), %error, "skipping corrupt node document");
                }
            }
        }
    }

    fn ensure_root_file(&self) -> GraphResult<()> {
        if !self.graph_dir.join("root.json").exists() {
            let root = self.inner.read().unwrap().root.clone();
            self.write_root_file(&root)?;
        }
        Ok(())
    }

    fn write_node_file(&self, node: &ConceptNode) -> GraphResult<()> {
        let path = self.root_dir.join(node.id.rel_path());
        self.write_json_atomic(&path, node)
    }

    fn write_root_file(&self, root: &RootDoc) -> GraphResult<()> {
        let path = self.graph_dir.join("root.json");
        self.write_json_atomic(&path, root)
    }

    fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> GraphResult<()> {
        if let Some(faults) = &self.faults {
            if faults.should_inject("graph_write").is_some() {
                return Err(GraphError::storage("injected fault during graph_write"));
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(value)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::{Tier, ValueLevel};
    use chrono::TimeZone;
    use mnema_core::sim::SimClock;

    fn sim_clock() -> Clock {
        Clock::Sim(SimClock::at_datetime(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn open_graph(dir: &Path) -> GraphStore {
        let clock = sim_clock();
        let journal = Arc::new(Journal::open(dir, clock.clone()).unwrap());
        GraphStore::open(dir, clock, journal).unwrap()
    }

    fn summary_for(record_id: &str) -> MemorySummary {
        MemorySummary {
            record_id: record_id.to_string(),
            path: format!("working/2026/03/01/{record_id}.txt"),
            summary: "a short summary".to_string(),
            tier: Tier::Working,
            value_level: ValueLevel::Medium,
            confidence: 70,
        }
    }

    #[test]
    fn test_first_run_writes_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());

        assert!(dir.path().join("graph/root.json").exists());
        assert!(graph.root_doc().top_level.is_empty());
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_create_top_level_nodes_allocate_indices() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());

        let a = graph.create_node(None, "memory systems", 80).unwrap();
        let b = graph.create_node(None, "retrieval", 80).unwrap();

        assert_eq!(a.as_str(), "1");
        assert_eq!(b.as_str(), "2");
        assert_eq!(graph.root_doc().top_level, vec!["1", "2"]);
        assert!(dir.path().join("graph/1.json").exists());
    }

    #[test]
    fn test_create_child_updates_parent_refs() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());

        let parent = graph.create_node(None, "memory systems", 80).unwrap();
        let child = graph.create_node(Some(&parent), "tiered storage", 75).unwrap();

        assert_eq!(child.as_str(), "1.1");
        let parent_node = graph.read_node(&parent).unwrap();
        assert!(parent_node
            .child_refs
            .iter()
            .any(|r| r.node_id == "1.1"));

        let child_node = graph.read_node(&child).unwrap();
        assert_eq!(child_node.parent_refs[0].node_id, "1");
        assert!(dir.path().join("graph/1/1.1.json").exists());
    }

    #[test]
    fn test_create_missing_parent_fails_clean() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());
        let ghost = NodeId::parse("7").unwrap();

        let err = graph.create_node(Some(&ghost), "orphan", 50).unwrap_err();
        assert!(matches!(err, GraphError::ParentNotFound { .. }));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_depth_cap_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());

        let mut current = graph.create_node(None, "level 1", 80).unwrap();
        for level in 2..=GRAPH_DEPTH_COUNT_MAX {
            current = graph
                .create_node(Some(&current), format!("level {level}"), 80)
                .unwrap();
        }
        assert_eq!(current.depth(), GRAPH_DEPTH_COUNT_MAX);

        let err = graph.create_node(Some(&current), "too deep", 80).unwrap_err();
        assert!(matches!(err, GraphError::TooDeep { depth: 11 }));
    }

    #[test]
    fn test_update_restamps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());
        let id = graph.create_node(None, "before", 50).unwrap();
        let created = graph.read_node(&id).unwrap().updated_at;

        graph.clock.as_sim().unwrap().advance_secs(60);
        graph
            .update_node(&id, NodePatch::new().with_content("after").with_confidence(90))
            .unwrap();

        let node = graph.read_node(&id).unwrap();
        assert_eq!(node.content, "after");
        assert_eq!(node.confidence, 90);
        assert!(node.updated_at > created);
    }

    #[test]
    fn test_delete_refuses_nonempty() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());
        let parent = graph.create_node(None, "parent", 80).unwrap();
        let child = graph.create_node(Some(&parent), "child", 80).unwrap();

        assert!(matches!(
            graph.delete_node(&parent),
            Err(GraphError::NotEmpty { .. })
        ));

        graph.delete_node(&child).unwrap();
        graph.delete_node(&parent).unwrap();
        assert_eq!(graph.node_count(), 0);
        assert!(graph.root_doc().top_level.is_empty());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());
        let id = graph.create_node(None, "concept", 80).unwrap();

        assert!(graph.attach_summary(&id, summary_for("M3_a")).unwrap());
        assert!(!graph.attach_summary(&id, summary_for("M3_a")).unwrap());

        let node = graph.read_node(&id).unwrap();
        assert_eq!(node.memory_summaries.len(), 1, "one entry, not two");
    }

    #[test]
    fn test_detach_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());
        let id = graph.create_node(None, "concept", 80).unwrap();
        graph.attach_summary(&id, summary_for("M3_a")).unwrap();

        assert!(graph.detach_summary(&id, "M3_a").unwrap());
        assert!(!graph.detach_summary(&id, "M3_a").unwrap());
        assert!(graph.read_node(&id).unwrap().memory_summaries.is_empty());
    }

    #[test]
    fn test_children_and_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());
        let a = graph.create_node(None, "a", 80).unwrap();
        let b = graph.create_node(Some(&a), "b", 80).unwrap();
        let c = graph.create_node(Some(&b), "c", 80).unwrap();

        let children = graph.children(&a).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].node_id, "1.1");

        let ancestors: Vec<String> = graph
            .ancestors(&c)
            .iter()
            .map(|a| a.as_str().to_string())
            .collect();
        assert_eq!(ancestors, vec!["1", "1.1"]);
    }

    #[test]
    fn test_reopen_restores_graph() {
        let dir = tempfile::tempdir().unwrap();
        let (parent, child) = {
            let graph = open_graph(dir.path());
            let parent = graph.create_node(None, "persisted", 80).unwrap();
            let child = graph.create_node(Some(&parent), "child", 75).unwrap();
            graph.attach_summary(&child, summary_for("M2_x")).unwrap();
            (parent, child)
        };

        let graph = open_graph(dir.path());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.read_node(&parent).unwrap().content, "persisted");
        assert_eq!(graph.read_node(&child).unwrap().memory_summaries.len(), 1);
        assert!(graph.verify_consistency().is_empty());
    }

    #[test]
    fn test_corrupt_root_installs_fresh_graph() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("graph")).unwrap();
        fs::write(dir.path().join("graph/root.json"), "{broken").unwrap();

        let graph = open_graph(dir.path());
        assert!(graph.root_doc().top_level.is_empty());
    }

    #[test]
    fn test_verify_consistency_reports_missing_link() {
        let dir = tempfile::tempdir().unwrap();
        let graph = open_graph(dir.path());
        let a = graph.create_node(None, "a", 80).unwrap();
        graph.create_node(Some(&a), "b", 80).unwrap();

        // Corrupt in memory: drop the child ref.
        graph
            .inner
            .write()
            .unwrap()
            .nodes
            .get_mut("1")
            .unwrap()
            .child_refs
            .clear();

        let issues = graph.verify_consistency();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("does not list child"));
    }
}
