//! Organize Plans and the Format Review
//!
//! Stage 4 renders the approved analysis into a concrete mutation plan;
//! stage 5 runs eight deterministic schema checks against it. Only a passing
//! format review authorizes commit, so a malformed plan can never mutate the
//! stores.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::constants::{ASSOCIATION_WEIGHT_MAX, ASSOCIATION_WEIGHT_MIN, CONFIDENCE_MAX};
use crate::graph::{GraphStore, NodeId};
use crate::store::record::RecordId;
use crate::store::RecordStore;

// =============================================================================
// Plan Types
// =============================================================================

/// A record the plan wants created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Record content
    pub content: String,
    /// Target tier index
    pub tier: u8,
    /// Category label
    #[serde(default)]
    pub category: Option<String>,
    /// Subcategory label
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Confidence; substrate default when absent
    #[serde(default)]
    pub confidence: Option<i64>,
    /// Node ids (or plan-node placeholders) to attach the record to
    #[serde(default)]
    pub attach_to: Vec<String>,
    /// Optional explicit creation stamp (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A node the plan wants created. The id may end in `?` (`1.?`) to request
/// the next free child index under the prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanNode {
    /// Proposed dotted id, possibly with a `?` placeholder
    pub id: String,
    /// Declared parent; must agree with the id
    #[serde(default)]
    pub parent: Option<String>,
    /// Concept description
    pub content: String,
    /// Confidence
    #[serde(default)]
    pub confidence: Option<i64>,
    /// Indices into `records` to attach here
    #[serde(default)]
    pub attach_records: Vec<usize>,
}

/// A tier promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPromotion {
    /// The record to move
    pub record_id: String,
    /// Target tier index
    pub to_tier: u8,
}

/// An association edge the plan wants created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAssociation {
    /// Source record id
    pub source: String,
    /// Target record id
    pub target: String,
    /// Relation label
    #[serde(default)]
    pub relation: Option<String>,
    /// Weight in [0, 1]
    #[serde(default)]
    pub weight: Option<f64>,
}

/// A confidence adjustment (bias audits downweight).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAdjustment {
    /// The record to adjust
    pub record_id: String,
    /// Signed confidence delta
    pub delta: i64,
}

/// The full stage-4 output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizePlan {
    /// Records to create
    #[serde(default)]
    pub records: Vec<PlanRecord>,
    /// Nodes to create
    #[serde(default)]
    pub nodes: Vec<PlanNode>,
    /// Tier promotions
    #[serde(default)]
    pub promotions: Vec<PlanPromotion>,
    /// Association edges to create
    #[serde(default)]
    pub associations: Vec<PlanAssociation>,
    /// Confidence adjustments
    #[serde(default)]
    pub adjustments: Vec<PlanAdjustment>,
    /// Whether to drop association edges queued for pruning
    #[serde(default)]
    pub prune_associations: bool,
    /// Replacement prompt hints (strategy rehearsal)
    #[serde(default)]
    pub strategy_hints: Option<String>,
}

impl OrganizePlan {
    /// Whether the plan mutates anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.nodes.is_empty()
            && self.promotions.is_empty()
            && self.associations.is_empty()
            && self.adjustments.is_empty()
            && !self.prune_associations
            && self.strategy_hints.is_none()
    }
}

// =============================================================================
// Format Review
// =============================================================================

/// Run the eight schema checks against a plan. Returns the violations; an
/// empty list authorizes commit.
#[must_use]
pub fn format_review(plan: &OrganizePlan, graph: &GraphStore, store: &RecordStore) -> Vec<String> {
    let mut violations = Vec::new();

    check_id_uniqueness(plan, graph, &mut violations);
    check_timestamp_format(plan, &mut violations);
    check_confidence_ranges(plan, &mut violations);
    check_path_layering(plan, graph, &mut violations);
    check_parent_backlinks(plan, &mut violations);
    check_no_cycles(plan, &mut violations);
    check_naming_convention(plan, &mut violations);
    check_file_name_convention(plan, store, &mut violations);

    violations
}

/// Check 1: plan node ids are unique and do not collide with existing nodes.
fn check_id_uniqueness(plan: &OrganizePlan, graph: &GraphStore, violations: &mut Vec<String>) {
    for (i, node) in plan.nodes.iter().enumerate() {
        for other in &plan.nodes[i + 1..] {
            if node.id == other.id {
                violations.push(format!("duplicate node id in plan: {}", node.id));
            }
        }
        if !node.id.contains('?') {
            if let Ok(id) = NodeId::parse(&node.id) {
                if graph.exists(&id) {
                    violations.push(format!("node id already exists: {}", node.id));
                }
            }
        }
    }
}

/// Check 2: explicit timestamps parse as RFC 3339.
fn check_timestamp_format(plan: &OrganizePlan, violations: &mut Vec<String>) {
    for record in &plan.records {
        if let Some(stamp) = &record.created_at {
            if DateTime::parse_from_rfc3339(stamp).is_err() {
                violations.push(format!("malformed timestamp: {stamp}"));
            }
        }
    }
}

/// Check 3: every confidence is inside [0, 100].
fn check_confidence_ranges(plan: &OrganizePlan, violations: &mut Vec<String>) {
    let range = 0..=i64::from(CONFIDENCE_MAX);
    for record in &plan.records {
        if let Some(confidence) = record.confidence {
            if !range.contains(&confidence) {
                violations.push(format!("record confidence out of range: {confidence}"));
            }
        }
    }
    for node in &plan.nodes {
        if let Some(confidence) = node.confidence {
            if !range.contains(&confidence) {
                violations.push(format!("node confidence out of range: {confidence}"));
            }
        }
    }
}

/// Check 4: a concrete node id layers directly under an existing parent
/// (or one created earlier in the same plan).
fn check_path_layering(plan: &OrganizePlan, graph: &GraphStore, violations: &mut Vec<String>) {
    for node in &plan.nodes {
        let Some(prefix) = concrete_parent_prefix(&node.id) else {
            continue; // top-level or placeholder under root
        };
        let parent_in_plan = plan
            .nodes
            .iter()
            .any(|other| other.id == prefix && other.id != node.id);
        let parent_exists = NodeId::parse(&prefix)
            .map(|id| graph.exists(&id))
            .unwrap_or(false);
        if !parent_in_plan && !parent_exists {
            violations.push(format!("node {} layers under missing parent {prefix}", node.id));
        }
    }
}

/// Check 5: a declared parent matches the parent derived from the id.
fn check_parent_backlinks(plan: &OrganizePlan, violations: &mut Vec<String>) {
    for node in &plan.nodes {
        let Some(declared) = &node.parent else {
            continue;
        };
        let derived = concrete_parent_prefix(&node.id);
        if derived.as_deref() != Some(declared.as_str()) {
            violations.push(format!(
                "node {} declares parent {declared} but its id derives {}",
                node.id,
                derived.unwrap_or_else(|| "root".to_string())
            ));
        }
    }
}

/// Check 6: no node is its own ancestor.
fn check_no_cycles(plan: &OrganizePlan, violations: &mut Vec<String>) {
    for node in &plan.nodes {
        if let Some(parent) = &node.parent {
            let base = node.id.trim_end_matches(".?").trim_end_matches('?');
            if parent == &node.id || (!base.is_empty() && parent.starts_with(&format!("{base}."))) {
                violations.push(format!("node {} would cycle through parent {parent}", node.id));
            }
        }
    }
}

/// Check 7: node ids follow the dotted grammar (digits, dots, no leading
/// zeros), allowing a single trailing `?` placeholder segment.
fn check_naming_convention(plan: &OrganizePlan, violations: &mut Vec<String>) {
    for node in &plan.nodes {
        let id = node.id.as_str();
        let concrete = if id == "?" {
            None // next free top-level index
        } else if let Some(prefix) = id.strip_suffix(".?") {
            Some(prefix)
        } else {
            Some(id)
        };
        if let Some(concrete) = concrete {
            if NodeId::parse(concrete).is_err() {
                violations.push(format!("node id violates naming convention: {id}"));
            }
        }
    }
}

/// Check 8: every referenced record id matches the record file-name grammar,
/// exists where required, and tiers/weights are in range.
fn check_file_name_convention(plan: &OrganizePlan, store: &RecordStore, violations: &mut Vec<String>) {
    fn check_record(store: &RecordStore, violations: &mut Vec<String>, raw: &str, must_exist: bool) {
        match RecordId::parse(raw) {
            Ok(id) => {
                if must_exist && store.get_meta(&id).is_none() {
                    violations.push(format!("referenced record does not exist: {raw}"));
                }
            }
            Err(_) => violations.push(format!("record id violates file-name convention: {raw}")),
        }
    }

    for promotion in &plan.promotions {
        check_record(store, violations, &promotion.record_id, true);
        if promotion.to_tier > 3 {
            violations.push(format!("promotion targets invalid tier: {}", promotion.to_tier));
        }
    }
    for adjustment in &plan.adjustments {
        check_record(store, violations, &adjustment.record_id, true);
    }
    for association in &plan.associations {
        check_record(store, violations, &association.source, true);
        check_record(store, violations, &association.target, true);
        if let Some(weight) = association.weight {
            if !(ASSOCIATION_WEIGHT_MIN..=ASSOCIATION_WEIGHT_MAX).contains(&weight) {
                violations.push(format!("association weight out of range: {weight}"));
            }
        }
    }
    for record in &plan.records {
        if record.tier > 3 {
            violations.push(format!("record targets invalid tier: {}", record.tier));
        }
    }
}

/// The parent prefix of a plan id, treating `1.2.?` as "under 1.2" and plain
/// `1.2` as "under 1". Returns `None` for top-level ids.
pub(crate) fn concrete_parent_prefix(id: &str) -> Option<String> {
    if id == "?" {
        return None;
    }
    if let Some(prefix) = id.strip_suffix(".?") {
        return Some(prefix.to_string());
    }
    id.rfind('.').map(|dot| id[..dot].to_string())
}

// =============================================================================
// Tests
// =============================================================================
