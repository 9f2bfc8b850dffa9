//! Maintenance Prompts - Planner Templates for the Review Chain

use crate::store::record::{truncate_chars, RecordMeta};

/// Question-output prompt template.
///
/// Placeholders: `{task}`, `{candidates}`
pub const QUESTION_OUTPUT_PROMPT: &str = r"You review a memory substrate during idle time.

Task: {task}

Candidate material:
{candidates}

List the concrete questions this material raises that the task should
address, one per line, each starting with 'question:'. List nothing if the
material needs no attention.";

/// Analysis prompt template.
///
/// Placeholders: `{task}`, `{questions}`, `{candidates}`
pub const ANALYSIS_PROMPT: &str = r#"You analyze maintenance questions for a memory substrate.

Task: {task}

Questions:
{questions}

Candidate material:
{candidates}

Reply with a single JSON object:
{"resources": ["ids involved"], "issues": ["observed problems"],
 "root_cause": "one sentence", "candidate_fixes": ["concrete fixes"]}
Only return the JSON object, nothing else."#;

/// Review prompt template.
///
/// Placeholders: `{task}`, `{analysis}`
pub const REVIEW_PROMPT: &str = r"You review a maintenance analysis for quality.

Task: {task}

Analysis:
{analysis}

Judge whether the analysis addresses the questions, proposes concrete store
operations, and is internally consistent. Reply with a single line:
verdict: pass | fail-minor | fail-major | fail-fatal
Optionally follow with one 'reason:' line.";

/// Organize prompt template.
///
/// Placeholders: `{task}`, `{analysis}`, `{graph}`
pub const ORGANIZE_PROMPT: &str = r#"You render an approved analysis into concrete store mutations.

Task: {task}

Approved analysis:
{analysis}

Current concept graph:
{graph}

Reply with a single JSON object; omit any list you do not need:
{"records": [{"content": "...", "tier": 2, "tags": [], "confidence": 70,
              "attach_to": ["1.2"]}],
 "nodes": [{"id": "1.?", "content": "...", "confidence": 80,
            "attach_records": [0]}],
 "promotions": [{"record_id": "M3_...", "to_tier": 2}],
 "associations": [{"source": "M2_...", "target": "M2_...",
                   "relation": "related", "weight": 0.5}],
 "adjustments": [{"record_id": "M2_...", "delta": -10}],
 "strategy_hints": null}
Node ids use digits and dots; '1.?' means the next free child of node 1.
Only return the JSON object, nothing else."#;

/// Render candidate records for the prompts.
#[must_use]
pub fn render_candidates(metas: &[RecordMeta]) -> String {
    if metas.is_empty() {
        return "(none)".to_string();
    }
    metas
        .iter()
        .map(|meta| {
            format!(
                "[{}] tier {} confidence {} accesses {}: {}",
                meta.id,
                meta.tier.index(),
                meta.confidence,
                meta.access_count,
                truncate_chars(&meta.preview, 150),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the question-output prompt.
#[must_use]
pub fn build_question_output(task: &str, candidates: &str) -> String {
    QUESTION_OUTPUT_PROMPT
        .replace("{task}", task)
        .replace("{candidates}", candidates)
}

/// Build the analysis prompt.
#[must_use]
pub fn build_analysis(task: &str, questions: &str, candidates: &str) -> String {
    ANALYSIS_PROMPT
        .replace("{task}", task)
        .replace("{questions}", questions)
        .replace("{candidates}", candidates)
}

/// Build the review prompt.
#[must_use]
pub fn build_review(task: &str, analysis: &str) -> String {
    REVIEW_PROMPT
        .replace("{task}", task)
        .replace("{analysis}", analysis)
}

/// Build the organize prompt.
#[must_use]
pub fn build_organize(task: &str, analysis: &str, graph: &str) -> String {
    ORGANIZE_PROMPT
        .replace("{task}", task)
        .replace("{analysis}", analysis)
        .replace("{graph}", graph)
}
