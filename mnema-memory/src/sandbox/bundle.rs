//! Context Bundle
//!
//! The fixed-shape output of bundle assembly. Grouping, gap detection, and
//! the confidence-level rule are deterministic; the planner only contributes
//! the free-text path note.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::constants::{BUNDLE_SUMMARY_CHARS_MAX, CONFIDENCE_HIGH_THRESHOLD, CONFIDENCE_MEDIUM_THRESHOLD};
use crate::graph::ConceptNode;
use crate::index::tokenize;
use crate::store::record::{truncate_chars, Record};

/// Tag that flags a record as conflicting; such records land in the
/// contrast group regardless of confidence.
pub const CONFLICT_TAG: &str = "conflict";

// =============================================================================
// Bundle Types
// =============================================================================

/// Classification of the utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    /// "what is X"
    Define,
    /// "why does X"
    ExplainWhy,
    /// "how do I X"
    HowTo,
    /// "X vs Y"
    Compare,
    /// Everything else
    FetchInfo,
}

/// Role of a record inside the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryRole {
    /// Core group: answers the question directly
    DirectlyAnswers,
    /// Support group: background and evidence
    Background,
    /// Contrast group: conflicting view
    Conflict,
}

/// One record entry in a memory group.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryGroupEntry {
    /// Record id
    pub record_id: String,
    /// Record confidence
    pub confidence: u8,
    /// Content truncated to ~100 chars
    pub summary: String,
    /// Role in the reply
    pub role: MemoryRole,
}

/// The three memory buckets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryGroups {
    /// Confidence ≥ 80
    pub core_group: Vec<MemoryGroupEntry>,
    /// 50 ≤ confidence < 80
    pub support_group: Vec<MemoryGroupEntry>,
    /// Explicitly flagged conflicting
    pub contrast_group: Vec<MemoryGroupEntry>,
}

impl MemoryGroups {
    /// Whether any group has an entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core_group.is_empty() && self.support_group.is_empty() && self.contrast_group.is_empty()
    }

    fn all_entries(&self) -> impl Iterator<Item = &MemoryGroupEntry> {
        self.core_group
            .iter()
            .chain(self.support_group.iter())
            .chain(self.contrast_group.iter())
    }
}

/// What the bundle knows it does not cover.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Gaps {
    /// Summaries seen on visited nodes but never loaded
    pub known_but_not_loaded: Vec<String>,
    /// Likely-relevant regions that were not visited
    pub suspected: Vec<String>,
    /// Ambiguities in the utterance itself
    pub needs_clarification: Vec<String>,
}

/// Overall confidence verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// ≥1 core record and average confidence ≥ 75
    High,
    /// Some record present
    Medium,
    /// Nothing usable collected
    Low,
}

/// Confidence assessment block.
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceAssessment {
    /// The level per the fixed rule
    pub level: ConfidenceLevel,
    /// Why
    pub basis: String,
    /// Known risks of answering from this bundle
    pub risks: Vec<String>,
}

/// Suggested reply approach.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplyStrategy {
    /// Recommended angles of attack
    pub recommended_angle: Vec<String>,
    /// Points the reply must include
    pub emphasize: Vec<String>,
    /// Points to hedge
    pub be_cautious: Vec<String>,
    /// Directions for follow-up
    pub extensions: Vec<String>,
}

/// The assembled context bundle handed to the external model.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    /// Utterance classification
    pub intent: Intent,
    /// Domain terms touched by the utterance or visited nodes
    pub key_concepts: Vec<String>,
    /// Heuristic follow-up needs
    pub implicit_needs: Vec<String>,
    /// Node ids visited, in order
    pub path: Vec<String>,
    /// One-sentence description of the walk
    pub path_note: String,
    /// The three memory buckets
    pub memory_groups: MemoryGroups,
    /// Known blind spots
    pub gaps: Gaps,
    /// Confidence verdict
    pub confidence_assessment: ConfidenceAssessment,
    /// Suggested reply approach
    pub reply_strategy: ReplyStrategy,
}

impl ContextBundle {
    /// Minimal bundle returned when the sandbox fails or runs out of budget.
    #[must_use]
    pub fn minimal(utterance: &str, risk: impl Into<String>) -> Self {
        Self {
            intent: classify_intent(utterance),
            key_concepts: Vec::new(),
            implicit_needs: Vec::new(),
            path: Vec::new(),
            path_note: "no concepts were visited".to_string(),
            memory_groups: MemoryGroups::default(),
            gaps: Gaps::default(),
            confidence_assessment: ConfidenceAssessment {
                level: ConfidenceLevel::Low,
                basis: "retrieval did not complete".to_string(),
                risks: vec![risk.into()],
            },
            reply_strategy: ReplyStrategy {
                be_cautious: vec!["answer from general knowledge only".to_string()],
                ..ReplyStrategy::default()
            },
        }
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Classify the utterance into one of the five intents.
#[must_use]
pub fn classify_intent(utterance: &str) -> Intent {
    let lower = utterance.to_lowercase();

    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if any(&["compare", " versus ", " vs ", "difference between", "对比", "区别"]) {
        Intent::Compare
    } else if any(&["how to", "how do", "how can", "how should", "怎么", "如何"]) {
        Intent::HowTo
    } else if any(&["why", "为什么", "为何"]) {
        Intent::ExplainWhy
    } else if any(&["what is", "what are", "define", "definition", "什么是", "是什么"]) {
        Intent::Define
    } else {
        Intent::FetchInfo
    }
}

/// Inputs to bundle assembly.
pub struct AssemblyInput<'a> {
    /// The user utterance
    pub utterance: &'a str,
    /// Nodes collected by concept location, in visit order
    pub nodes: &'a [ConceptNode],
    /// Records collected by record selection
    pub records: &'a [Record],
    /// Keys currently known to the inverted index
    pub known_keywords: &'a BTreeSet<String>,
    /// Free-text note from the planner, if any
    pub path_note: Option<String>,
    /// Records below this confidence stay out of the groups
    pub display_threshold: u8,
}

/// Assemble the fixed-shape bundle.
#[must_use]
pub fn assemble(input: &AssemblyInput<'_>) -> ContextBundle {
    let intent = classify_intent(input.utterance);
    let groups = group_records(input.records, input.display_threshold);
    let key_concepts = collect_key_concepts(input);
    let gaps = detect_gaps(input, intent);
    let assessment = assess_confidence(&groups);
    let reply_strategy = build_strategy(intent, &groups, &gaps);

    let path: Vec<String> = input
        .nodes
        .iter()
        .map(|n| n.id.as_str().to_string())
        .collect();
    let path_note = input
        .path_note
        .clone()
        .filter(|note| !note.trim().is_empty())
        .unwrap_or_else(|| default_path_note(input.nodes));

    ContextBundle {
        intent,
        key_concepts,
        implicit_needs: implicit_needs(intent, &groups),
        path,
        path_note,
        memory_groups: groups,
        gaps,
        confidence_assessment: assessment,
        reply_strategy,
    }
}

fn group_records(records: &[Record], display_threshold: u8) -> MemoryGroups {
    let mut groups = MemoryGroups::default();
    for record in records {
        let meta = &record.meta;
        let entry = |role| MemoryGroupEntry {
            record_id: meta.id.as_str().to_string(),
            confidence: meta.confidence,
            summary: truncate_chars(&record.content, BUNDLE_SUMMARY_CHARS_MAX),
            role,
        };

        if meta.tags.contains(CONFLICT_TAG) {
            groups.contrast_group.push(entry(MemoryRole::Conflict));
        } else if meta.confidence >= CONFIDENCE_HIGH_THRESHOLD {
            groups.core_group.push(entry(MemoryRole::DirectlyAnswers));
        } else if meta.confidence >= CONFIDENCE_MEDIUM_THRESHOLD {
            groups.support_group.push(entry(MemoryRole::Background));
        } else if meta.confidence >= display_threshold {
            // Below the support cutoff but still displayable: background.
            groups.support_group.push(entry(MemoryRole::Background));
        }
    }
    groups
}

fn collect_key_concepts(input: &AssemblyInput<'_>) -> Vec<String> {
    let mut concepts: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for token in tokenize::tokenize(input.utterance) {
        if input.known_keywords.contains(&token) && seen.insert(token.clone()) {
            concepts.push(token);
        }
    }
    for node in input.nodes {
        let name = node.content.trim().to_string();
        if !name.is_empty() && seen.insert(name.clone()) {
            concepts.push(name);
        }
    }
    concepts
}

fn detect_gaps(input: &AssemblyInput<'_>, intent: Intent) -> Gaps {
    let mut gaps = Gaps::default();

    let loaded: BTreeSet<&str> = input
        .records
        .iter()
        .map(|r| r.meta.id.as_str())
        .collect();
    let visited: BTreeSet<&str> = input.nodes.iter().map(|n| n.id.as_str()).collect();

    for node in input.nodes {
        for summary in &node.memory_summaries {
            if !loaded.contains(summary.record_id.as_str()) {
                gaps.known_but_not_loaded
                    .push(format!("{}: {}", summary.record_id, summary.summary));
            }
        }
        for child in &node.child_refs {
            if !visited.contains(child.node_id.as_str()) {
                gaps.suspected
                    .push(format!("unvisited subconcept {}", child.node_id));
            }
        }
    }

    if tokenize::tokenize(input.utterance).len() < 2 {
        gaps.needs_clarification
            .push("the question names no concrete concept".to_string());
    } else if intent == Intent::Compare && input.nodes.len() < 2 {
        gaps.needs_clarification
            .push("a comparison needs both sides located".to_string());
    }

    gaps
}

fn assess_confidence(groups: &MemoryGroups) -> ConfidenceAssessment {
    let entries: Vec<&MemoryGroupEntry> = groups.all_entries().collect();
    let average = if entries.is_empty() {
        0.0
    } else {
        entries.iter().map(|e| f64::from(e.confidence)).sum::<f64>() / entries.len() as f64
    };

    let level = if !groups.core_group.is_empty() && average >= 75.0 {
        ConfidenceLevel::High
    } else if !entries.is_empty() {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    let basis = match level {
        ConfidenceLevel::High => format!(
            "{} core records, average confidence {average:.0}",
            groups.core_group.len()
        ),
        ConfidenceLevel::Medium => format!(
            "{} records collected, average confidence {average:.0}",
            entries.len()
        ),
        ConfidenceLevel::Low => "no records were collected".to_string(),
    };

    let mut risks = Vec::new();
    if !groups.contrast_group.is_empty() {
        risks.push(format!(
            "{} conflicting records in the contrast group",
            groups.contrast_group.len()
        ));
    }
    if level != ConfidenceLevel::Low && average < 60.0 {
        risks.push("average confidence is weak".to_string());
    }
    if level == ConfidenceLevel::Low {
        risks.push("reply would rest on general knowledge only".to_string());
    }

    ConfidenceAssessment {
        level,
        basis,
        risks,
    }
}

fn implicit_needs(intent: Intent, groups: &MemoryGroups) -> Vec<String> {
    let mut needs = Vec::new();
    match intent {
        Intent::HowTo => needs.push("prerequisites and setup steps".to_string()),
        Intent::Compare => needs.push("criteria for judging the options".to_string()),
        Intent::ExplainWhy => needs.push("the causal chain behind the behavior".to_string()),
        Intent::Define => needs.push("boundaries against neighboring concepts".to_string()),
        Intent::FetchInfo => {}
    }
    if !groups.contrast_group.is_empty() {
        needs.push("resolution of the conflicting records".to_string());
    }
    needs
}

fn build_strategy(intent: Intent, groups: &MemoryGroups, gaps: &Gaps) -> ReplyStrategy {
    let mut strategy = ReplyStrategy::default();

    strategy.recommended_angle.push(
        match intent {
            Intent::Define => "open with the strongest definition on record",
            Intent::ExplainWhy => "walk the causal chain from the core records",
            Intent::HowTo => "give the steps, grounded in recorded experience",
            Intent::Compare => "contrast the sides along shared criteria",
            Intent::FetchInfo => "report what the records state, cited by id",
        }
        .to_string(),
    );

    for entry in groups.core_group.iter().take(3) {
        strategy
            .emphasize
            .push(format!("{}: {}", entry.record_id, entry.summary));
    }
    for entry in &groups.contrast_group {
        strategy
            .be_cautious
            .push(format!("conflicting record {}", entry.record_id));
    }
    if !gaps.known_but_not_loaded.is_empty() {
        strategy
            .be_cautious
            .push("related records exist that were not loaded".to_string());
    }
    for suspected in gaps.suspected.iter().take(3) {
        strategy.extensions.push(suspected.clone());
    }

    strategy
}

fn default_path_note(nodes: &[ConceptNode]) -> String {
    match nodes {
        [] => "no concepts were visited".to_string(),
        [only] => format!("single concept {} covered the question", only.id),
        [first, .., last] => format!(
            "walked {} concepts from {} to {}",
            nodes.len(),
            first.id,
            last.id
        ),
    }
}

// =============================================================================
// Tests
// =============================================================================
