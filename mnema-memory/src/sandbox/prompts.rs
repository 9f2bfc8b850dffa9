//! Sandbox Prompts - Planner Templates for the Staged Walk
//!
//! Structured prompts with a strict line protocol: one path per line,
//! an optional `note:` line, nothing else.

use crate::graph::{ConceptNode, RootDoc};
use crate::store::record::truncate_chars;

/// Concept-location prompt template.
///
/// Placeholders: `{utterance}`, `{overview}`, `{collected}`, `{hints}`
pub const CONCEPT_LOCATION_PROMPT: &str = r"You navigate a concept graph to locate nodes relevant to the question.

Question: {utterance}

Graph overview:
{overview}

Collected so far:
{collected}
{hints}
Output one node path per line (for example: 3.1.2). Optionally end with a
single line starting with 'note:' explaining the selection. Unknown paths
produce a system notice on the next round. Output nothing when done.";

/// Record-selection prompt template.
///
/// Placeholders: `{utterance}`, `{nodes}`, `{collected}`
pub const RECORD_SELECTION_PROMPT: &str = r"You select memory records worth reading in full, using the summaries
attached to the located concept nodes.

Question: {utterance}

Located nodes and their record summaries:
{nodes}

Records already loaded:
{collected}

Prefer high-confidence, high-value, directly relevant records. Watch for
complementary and conflicting pairs. Output one record id per line (for
example: M2_20260301123045123_ab12cd). Optionally end with a single 'note:'
line. Output nothing when done.";

/// Assembly-note prompt template.
///
/// Placeholders: `{utterance}`, `{path}`
pub const ASSEMBLY_NOTE_PROMPT: &str = r"The walk for the question below visited these concepts in order:
{path}

Question: {utterance}

Reply with one short sentence describing why this path answers the question.
Reply with nothing if the path speaks for itself.";

/// Render the graph overview: the root listing plus top-level node content.
#[must_use]
pub fn render_overview(root: &RootDoc, top_nodes: &[ConceptNode]) -> String {
    if root.top_level.is_empty() {
        return "(the graph is empty)".to_string();
    }
    let mut lines = Vec::new();
    for id in &root.top_level {
        match top_nodes.iter().find(|n| n.id.as_str() == id.as_str()) {
            Some(node) => lines.push(format!("{id}: {}", node.content)),
            None => lines.push(id.clone()),
        }
    }
    lines.join("\n")
}

/// Render collected nodes with their children and record summaries.
#[must_use]
pub fn render_nodes(nodes: &[ConceptNode]) -> String {
    if nodes.is_empty() {
        return "(none)".to_string();
    }
    let mut lines = Vec::new();
    for node in nodes {
        lines.push(format!("{}: {}", node.id, node.content));
        for child in &node.child_refs {
            lines.push(format!("  child {}", child.node_id));
        }
        for summary in &node.memory_summaries {
            lines.push(format!(
                "  record {} ({}, {}, confidence {}): {}",
                summary.record_id,
                summary.tier.dir_name(),
                summary.value_level,
                summary.confidence,
                summary.summary,
            ));
        }
    }
    lines.join("\n")
}

/// Render already-collected record previews.
#[must_use]
pub fn render_records(previews: &[(String, String)]) -> String {
    if previews.is_empty() {
        return "(none)".to_string();
    }
    previews
        .iter()
        .map(|(id, preview)| format!("{id}: {}", truncate_chars(preview, 120)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the concept-location prompt.
#[must_use]
pub fn build_concept_location(
    utterance: &str,
    overview: &str,
    collected: &str,
    hints: Option<&str>,
) -> String {
    let hints = match hints {
        Some(hints) if !hints.trim().is_empty() => format!("Hints from past sessions:\n{hints}\n"),
        _ => String::new(),
    };
    CONCEPT_LOCATION_PROMPT
        .replace("{utterance}", utterance)
        .replace("{overview}", overview)
        .replace("{collected}", collected)
        .replace("{hints}", &hints)
}

/// Build the record-selection prompt.
#[must_use]
pub fn build_record_selection(utterance: &str, nodes: &str, collected: &str) -> String {
    RECORD_SELECTION_PROMPT
        .replace("{utterance}", utterance)
        .replace("{nodes}", nodes)
        .replace("{collected}", collected)
}

/// Build the assembly-note prompt.
#[must_use]
pub fn build_assembly_note(utterance: &str, path: &str) -> String {
    ASSEMBLY_NOTE_PROMPT
        .replace("{utterance}", utterance)
        .replace("{path}", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_location_prompt_structure() {
        let prompt = build_concept_location("what is decay", "1: tiers", "(none)", None);
        assert!(prompt.contains("Question: what is decay"));
        assert!(prompt.contains("1: tiers"));
        assert!(prompt.contains("one node path per line"));
        assert!(!prompt.contains("Hints from past sessions"));
    }

    #[test]
    fn test_hints_included_when_present() {
        let prompt =
            build_concept_location("q", "(the graph is empty)", "(none)", Some("start at 2"));
        assert!(prompt.contains("Hints from past sessions:\nstart at 2"));
    }

    #[test]
    fn test_render_empty_overview() {
        let root = RootDoc::default();
        assert_eq!(render_overview(&root, &[]), "(the graph is empty)");
    }

    #[test]
    fn test_render_records_previews() {
        let previews = vec![("M2_x".to_string(), "some content".to_string())];
        let rendered = render_records(&previews);
        assert_eq!(rendered, "M2_x: some content");
    }
}
