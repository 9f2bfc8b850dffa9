//! Concept Node Types
//!
//! Nodes are addressed by dotted paths (`3.1.2`). The dotted-id rule makes
//! parent chains acyclic by construction; depth is capped at the edge of
//! every traversal and allocation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{GraphError, GraphResult};
use crate::constants::{GRAPH_DEPTH_COUNT_MAX, GRAPH_STRENGTH_DEFAULT};
use crate::store::record::{Tier, ValueLevel};

// =============================================================================
// NodeId
// =============================================================================

/// Dotted-path node id: `\d+(\.\d+)*`, positive segments, no leading zeros,
/// depth ≤ 10.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Parse and validate an id string.
    ///
    /// # Errors
    /// Returns `InvalidId` on empty segments, leading zeros, non-digits, or
    /// excessive depth.
    pub fn parse(raw: &str) -> GraphResult<Self> {
        let invalid = |why: &str| GraphError::invalid_id(format!("{why}: {raw}"));

        if raw.is_empty() {
            return Err(invalid("empty id"));
        }
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() > GRAPH_DEPTH_COUNT_MAX {
            return Err(GraphError::TooDeep {
                depth: segments.len(),
            });
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("non-digit segment"));
            }
            if segment.len() > 1 && segment.starts_with('0') {
                return Err(invalid("leading zero"));
            }
            if *segment == "0" {
                return Err(invalid("zero segment"));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Build the id of a direct child.
    #[must_use]
    pub fn child(&self, index: u32) -> Self {
        debug_assert!(index > 0, "child indices start at 1");
        Self(format!("{}.{index}", self.0))
    }

    /// Build a top-level id.
    #[must_use]
    pub fn top_level(index: u32) -> Self {
        debug_assert!(index > 0, "top-level indices start at 1");
        Self(index.to_string())
    }

    /// Number of dot-separated segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }

    /// Parent id, or `None` for a top-level node.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('.').map(|dot| Self(self.0[..dot].to_string()))
    }

    /// All proper ancestors, outermost first.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(id) = current {
            current = id.parent();
            out.push(id);
        }
        out.reverse();
        out
    }

    /// Numeric segments.
    #[must_use]
    pub fn segments(&self) -> Vec<u32> {
        self.0
            .split('.')
            .map(|s| s.parse().expect("validated at construction"))
            .collect()
    }

    /// Last segment (the child index under the parent).
    #[must_use]
    pub fn last_segment(&self) -> u32 {
        *self.segments().last().expect("at least one segment")
    }

    /// Node document path relative to the substrate root:
    /// `graph/<seg1>/…/<seg n-1>/<node_id>.json`.
    #[must_use]
    pub fn rel_path(&self) -> String {
        let segments: Vec<&str> = self.0.split('.').collect();
        let mut path = String::from("graph");
        for segment in &segments[..segments.len() - 1] {
            path.push('/');
            path.push_str(segment);
        }
        path.push('/');
        path.push_str(&self.0);
        path.push_str(".json");
        path
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// References
// =============================================================================

/// A parent or child reference carried on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRef {
    /// Referenced node id
    pub node_id: String,
    /// Document path of the referenced node
    pub path: String,
    /// Link strength in [0, 100]
    pub strength: u8,
}

impl NodeRef {
    /// Reference a node with default strength.
    #[must_use]
    pub fn to(id: &NodeId) -> Self {
        Self {
            node_id: id.as_str().to_string(),
            path: id.rel_path(),
            strength: GRAPH_STRENGTH_DEFAULT,
        }
    }
}

/// A record summary carried on a node (the node-side half of a record
/// link; the record holds the matching back-reference).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySummary {
    /// Referenced record id
    pub record_id: String,
    /// Content-file path of the record
    pub path: String,
    /// Short summary shown during record selection
    pub summary: String,
    /// Record tier at attach time
    pub tier: Tier,
    /// Record value level at attach time
    pub value_level: ValueLevel,
    /// Record confidence at attach time
    pub confidence: u8,
}

// =============================================================================
// ConceptNode
// =============================================================================

/// A node of the concept navigation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    /// Dotted-path id
    pub id: NodeId,
    /// Short concept description
    pub content: String,
    /// Confidence in [0, 100]
    pub confidence: u8,
    /// Creation stamp
    pub created_at: DateTime<Utc>,
    /// Last update stamp
    pub updated_at: DateTime<Utc>,
    /// Upward links
    pub parent_refs: Vec<NodeRef>,
    /// Downward links
    pub child_refs: Vec<NodeRef>,
    /// Attached record summaries
    pub memory_summaries: Vec<MemorySummary>,
}

impl ConceptNode {
    /// Number of dot-separated segments in the id.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.id.depth()
    }

    /// Whether the node can be deleted (no children, no summaries).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.child_refs.is_empty() && self.memory_summaries.is_empty()
    }

    /// Child index one past the highest existing child.
    #[must_use]
    pub fn next_child_index(&self) -> u32 {
        self.child_refs
            .iter()
            .filter_map(|r| r.node_id.rsplit('.').next())
            .filter_map(|s| s.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }
}

/// Patch for `update_node`.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    /// New content, if changing
    pub content: Option<String>,
    /// New confidence, if changing
    pub confidence: Option<u8>,
}

impl NodePatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_ids() {
        assert!(NodeId::parse("1").is_ok());
        assert!(NodeId::parse("3.1.2").is_ok());
        assert!(NodeId::parse("10.20.30").is_ok());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(NodeId::parse("").is_err());
        assert!(NodeId::parse("1..2").is_err());
        assert!(NodeId::parse("01.2").is_err(), "leading zero");
        assert!(NodeId::parse("0").is_err(), "zero segment");
        assert!(NodeId::parse("1.a").is_err());
        assert!(NodeId::parse("1.2.").is_err());
    }

    #[test]
    fn test_parse_depth_cap() {
        let depth10 = "1.1.1.1.1.1.1.1.1.1";
        assert!(NodeId::parse(depth10).is_ok());

        let depth11 = "1.1.1.1.1.1.1.1.1.1.1";
        assert!(matches!(
            NodeId::parse(depth11),
            Err(GraphError::TooDeep { depth: 11 })
        ));
    }

    #[test]
    fn test_parent_and_ancestors() {
        let id = NodeId::parse("3.1.2").unwrap();
        assert_eq!(id.parent().unwrap().as_str(), "3.1");
        assert_eq!(id.depth(), 3);

        let ancestors: Vec<String> = id
            .ancestors()
            .iter()
            .map(|a| a.as_str().to_string())
            .collect();
        assert_eq!(ancestors, vec!["3", "3.1"]);

        assert!(NodeId::parse("3").unwrap().parent().is_none());
    }

    #[test]
    fn test_rel_path_layout() {
        assert_eq!(NodeId::parse("1").unwrap().rel_path(), "graph/1.json");
        assert_eq!(NodeId::parse("1.2").unwrap().rel_path(), "graph/1/1.2.json");
        assert_eq!(
            NodeId::parse("1.2.3").unwrap().rel_path(),
            "graph/1/2/1.2.3.json"
        );
    }

    #[test]
    fn test_child_allocation() {
        let parent = NodeId::parse("2").unwrap();
        assert_eq!(parent.child(3).as_str(), "2.3");
        assert_eq!(NodeId::top_level(4).as_str(), "4");
    }

    #[test]
    fn test_next_child_index() {
        let id = NodeId::parse("1").unwrap();
        let mut node = ConceptNode {
            id: id.clone(),
            content: "root concept".to_string(),
            confidence: 80,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            parent_refs: Vec::new(),
            child_refs: Vec::new(),
            memory_summaries: Vec::new(),
        };
        assert_eq!(node.next_child_index(), 1);

        node.child_refs.push(NodeRef::to(&id.child(1)));
        node.child_refs.push(NodeRef::to(&id.child(4)));
        assert_eq!(node.next_child_index(), 5);
    }
}
