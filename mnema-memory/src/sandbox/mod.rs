//! Concept Sandbox - Three-Stage Retrieval Planner
//!
//! The heart of the substrate: a staged walk driven by the external planner.
//! S1 locates concept nodes, S2 selects records, S3 assembles the context
//! bundle. Missing paths are logged and counted but never abort a stage; the
//! stage continues with whatever it could load. Every planner call is bounded
//! by the per-call timeout, the whole walk by the sandbox budget.

pub mod bundle;
pub mod prompts;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::SubstrateConfig;
use crate::graph::{ConceptNode, GraphError, GraphStore, NodeId};
use crate::journal::{Journal, JournalKind};
use crate::planner::{PlannerProvider, PlannerRequest};
use crate::store::error::StoreError;
use crate::store::record::{Record, RecordId};
use crate::store::RecordStore;

pub use self::bundle::{
    AssemblyInput, ConfidenceAssessment, ConfidenceLevel, ContextBundle, Gaps, Intent,
    MemoryGroupEntry, MemoryGroups, MemoryRole, ReplyStrategy,
};

// =============================================================================
// Errors and States
// =============================================================================

/// Unrecoverable sandbox failure (backing-store loss).
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Record store failure
    #[error("record store: {0}")]
    Store(#[from] StoreError),

    /// Concept graph failure
    #[error("concept graph: {0}")]
    Graph(#[from] GraphError),
}

/// Sandbox state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Stage 1: concept location
    S1Nav,
    /// Stage 2: record selection
    S2Pick,
    /// Stage 3: bundle assembly
    S3Assemble,
    /// Completed
    Done,
    /// Budget exceeded or unrecoverable failure
    Failed,
}

/// Stage identifier carried on log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Concept location
    S1Nav,
    /// Record selection
    S2Pick,
    /// Bundle assembly
    S3Assemble,
}

impl StageId {
    /// Stage name for journaling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S1Nav => "s1_nav",
            Self::S2Pick => "s2_pick",
            Self::S3Assemble => "s3_assemble",
        }
    }
}

/// Kind of a stage log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageLogKind {
    /// Prompt sent to the planner
    Input,
    /// Planner output
    Output,
    /// Engine-side notice
    System,
    /// A path that failed to resolve
    Error,
}

/// One per-stage log record.
#[derive(Debug, Clone, Serialize)]
pub struct StageLogEntry {
    /// Which stage
    pub stage: StageId,
    /// Round number within the stage (1-based; 0 for stage-level entries)
    pub round: usize,
    /// When
    pub timestamp: DateTime<Utc>,
    /// Entry kind
    pub kind: StageLogKind,
    /// Human-readable message
    pub message: String,
    /// Paths involved
    pub paths: Vec<String>,
}

/// Result of one sandbox run.
#[derive(Debug)]
pub struct SandboxOutcome {
    /// Terminal state (`Done` or `Failed`)
    pub state: SandboxState,
    /// The assembled (or minimal) bundle
    pub bundle: ContextBundle,
    /// Per-stage log records
    pub logs: Vec<StageLogEntry>,
    /// Navigation failures encountered in this run
    pub nav_failures: u32,
    /// Planner notes gathered along the way
    pub notes: Vec<String>,
}

// =============================================================================
// Sandbox
// =============================================================================

/// The three-stage retrieval sandbox.
pub struct Sandbox<P: PlannerProvider> {
    planner: P,
    store: Arc<RecordStore>,
    graph: Arc<GraphStore>,
    journal: Arc<Journal>,
    clock: Clock,
    config: SubstrateConfig,
}

impl<P: PlannerProvider> Sandbox<P> {
    /// Create a sandbox over the stores.
    #[must_use]
    pub fn new(
        planner: P,
        store: Arc<RecordStore>,
        graph: Arc<GraphStore>,
        journal: Arc<Journal>,
        clock: Clock,
        config: SubstrateConfig,
    ) -> Self {
        Self {
            planner,
            store,
            graph,
            journal,
            clock,
            config,
        }
    }

    /// Run the full three-stage walk for one utterance.
    ///
    /// # Errors
    /// Only unrecoverable backing-store failures; missing paths, planner
    /// timeouts and the budget ceiling all resolve to an `Ok` outcome.
    #[tracing::instrument(skip(self, utterance))]
    pub async fn run(&self, utterance: &str) -> Result<SandboxOutcome, SandboxError> {
        let started = Instant::now();
        let mut logs = Vec::new();
        let mut notes = Vec::new();
        let mut nav_failures = 0u32;

        // Stage 1: concept location.
        let mut collected_nodes: Vec<ConceptNode> = Vec::new();
        self.journal
            .append(JournalKind::StageBegin, json!({"stage": StageId::S1Nav.as_str()}));
        let s1_complete = self
            .run_concept_location(
                utterance,
                started,
                &mut collected_nodes,
                &mut logs,
                &mut notes,
                &mut nav_failures,
            )
            .await?;
        self.journal.append(
            JournalKind::StageEnd,
            json!({"stage": StageId::S1Nav.as_str(), "collected": collected_nodes.len()}),
        );
        if !s1_complete {
            return Ok(self.failed_outcome(utterance, logs, notes, nav_failures));
        }

        // Stage 2: record selection.
        let mut collected_records: Vec<Record> = Vec::new();
        self.journal
            .append(JournalKind::StageBegin, json!({"stage": StageId::S2Pick.as_str()}));
        let s2_complete = self
            .run_record_selection(
                utterance,
                started,
                &collected_nodes,
                &mut collected_records,
                &mut logs,
                &mut notes,
                &mut nav_failures,
            )
            .await?;
        self.journal.append(
            JournalKind::StageEnd,
            json!({"stage": StageId::S2Pick.as_str(), "collected": collected_records.len()}),
        );
        if !s2_complete {
            return Ok(self.failed_outcome(utterance, logs, notes, nav_failures));
        }

        // Stage 3: bundle assembly.
        self.journal.append(
            JournalKind::StageBegin,
            json!({"stage": StageId::S3Assemble.as_str()}),
        );
        let bundle = self
            .run_assembly(utterance, started, &collected_nodes, &collected_records, &mut logs)
            .await;
        self.journal.append(
            JournalKind::StageEnd,
            json!({"stage": StageId::S3Assemble.as_str()}),
        );

        Ok(SandboxOutcome {
            state: SandboxState::Done,
            bundle,
            logs,
            nav_failures,
            notes,
        })
    }

    // =========================================================================
    // Stage 1
    // =========================================================================

    /// Returns `false` when the budget ran out mid-stage.
    async fn run_concept_location(
        &self,
        utterance: &str,
        started: Instant,
        collected: &mut Vec<ConceptNode>,
        logs: &mut Vec<StageLogEntry>,
        notes: &mut Vec<String>,
        nav_failures: &mut u32,
    ) -> Result<bool, SandboxError> {
        let root = self.graph.root_doc();
        let top_nodes: Vec<ConceptNode> = root
            .top_level
            .iter()
            .filter_map(|id| NodeId::parse(id).ok())
            .filter_map(|id| self.graph.read_node(&id).ok())
            .collect();
        let overview = prompts::render_overview(&root, &top_nodes);
        let hints = self.store.navigation().strategy_hints;
        let mut notices: Vec<String> = Vec::new();

        for round in 1..=self.config.max_rounds_per_stage {
            if self.budget_exceeded(started) {
                self.log(logs, StageId::S1Nav, round, StageLogKind::System, "sandbox budget exceeded", vec![]);
                return Ok(false);
            }
            if collected.len() >= self.config.max_nodes_per_request {
                self.log(logs, StageId::S1Nav, round, StageLogKind::System, "node cap reached", vec![]);
                break;
            }

            let mut state = prompts::render_nodes(collected);
            for notice in &notices {
                state.push('\n');
                state.push_str(notice);
            }
            let prompt =
                prompts::build_concept_location(utterance, &overview, &state, hints.as_deref());
            self.log(logs, StageId::S1Nav, round, StageLogKind::Input, "prompt sent", vec![]);

            let response = self.call_planner(prompt, StageId::S1Nav, round, logs).await;
            let (paths, mut new_notes) = parse_planner_lines(&response);
            notes.append(&mut new_notes);
            self.log(
                logs,
                StageId::S1Nav,
                round,
                StageLogKind::Output,
                format!("{} paths returned", paths.len()),
                paths.clone(),
            );
            if paths.is_empty() {
                break;
            }

            for path in paths {
                if collected.len() >= self.config.max_nodes_per_request {
                    break;
                }
                match self.resolve_node(&path) {
                    Some(node) => {
                        if !collected.iter().any(|n| n.id == node.id) {
                            collected.push(node);
                        }
                    }
                    None => {
                        self.log(
                            logs,
                            StageId::S1Nav,
                            round,
                            StageLogKind::Error,
                            format!("path does not resolve: {path}"),
                            vec![path.clone()],
                        );
                        self.store.record_nav_failure(&path);
                        *nav_failures += 1;
                        notices.push(format!("missing: {path}"));
                    }
                }
            }
        }
        Ok(true)
    }

    // =========================================================================
    // Stage 2
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    async fn run_record_selection(
        &self,
        utterance: &str,
        started: Instant,
        nodes: &[ConceptNode],
        collected: &mut Vec<Record>,
        logs: &mut Vec<StageLogEntry>,
        notes: &mut Vec<String>,
        nav_failures: &mut u32,
    ) -> Result<bool, SandboxError> {
        let nodes_render = prompts::render_nodes(nodes);
        let mut notices: Vec<String> = Vec::new();

        for round in 1..=self.config.max_rounds_per_stage {
            if self.budget_exceeded(started) {
                self.log(logs, StageId::S2Pick, round, StageLogKind::System, "sandbox budget exceeded", vec![]);
                return Ok(false);
            }
            if collected.len() >= self.config.max_records_per_request {
                self.log(logs, StageId::S2Pick, round, StageLogKind::System, "record cap reached", vec![]);
                break;
            }

            let mut previews: Vec<(String, String)> = collected
                .iter()
                .map(|r| (r.meta.id.as_str().to_string(), r.meta.preview.clone()))
                .collect();
            for notice in &notices {
                previews.push(("notice".to_string(), notice.clone()));
            }
            let prompt = prompts::build_record_selection(
                utterance,
                &nodes_render,
                &prompts::render_records(&previews),
            );
            self.log(logs, StageId::S2Pick, round, StageLogKind::Input, "prompt sent", vec![]);

            let response = self.call_planner(prompt, StageId::S2Pick, round, logs).await;
            let (paths, mut new_notes) = parse_planner_lines(&response);
            notes.append(&mut new_notes);
            self.log(
                logs,
                StageId::S2Pick,
                round,
                StageLogKind::Output,
                format!("{} paths returned", paths.len()),
                paths.clone(),
            );
            if paths.is_empty() {
                break;
            }

            for path in paths {
                if collected.len() >= self.config.max_records_per_request {
                    break;
                }
                match self.resolve_record(&path)? {
                    Some(record) => {
                        if !collected.iter().any(|r| r.meta.id == record.meta.id) {
                            collected.push(record);
                        }
                    }
                    None => {
                        self.log(
                            logs,
                            StageId::S2Pick,
                            round,
                            StageLogKind::Error,
                            format!("record does not resolve: {path}"),
                            vec![path.clone()],
                        );
                        self.store.record_nav_failure(&path);
                        *nav_failures += 1;
                        notices.push(format!("missing: {path}"));
                    }
                }
            }
        }
        Ok(true)
    }

    // =========================================================================
    // Stage 3
    // =========================================================================

    async fn run_assembly(
        &self,
        utterance: &str,
        started: Instant,
        nodes: &[ConceptNode],
        records: &[Record],
        logs: &mut Vec<StageLogEntry>,
    ) -> ContextBundle {
        let path_render = nodes
            .iter()
            .map(|n| n.id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");

        let path_note = if self.budget_exceeded(started) || nodes.is_empty() {
            None
        } else {
            let prompt = prompts::build_assembly_note(utterance, &path_render);
            self.log(logs, StageId::S3Assemble, 1, StageLogKind::Input, "prompt sent", vec![]);
            let note = self
                .call_planner(prompt, StageId::S3Assemble, 1, logs)
                .await;
            let note = note.trim().to_string();
            (!note.is_empty()).then_some(note)
        };

        let known_keywords: BTreeSet<String> = self.store.index().known_keywords();
        let bundle = bundle::assemble(&AssemblyInput {
            utterance,
            nodes,
            records,
            known_keywords: &known_keywords,
            path_note,
            display_threshold: self.config.confidence_display_threshold,
        });
        self.log(
            logs,
            StageId::S3Assemble,
            1,
            StageLogKind::System,
            format!(
                "bundle assembled: {} nodes, {} records",
                nodes.len(),
                records.len()
            ),
            vec![],
        );
        bundle
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn call_planner(
        &self,
        prompt: String,
        stage: StageId,
        round: usize,
        logs: &mut Vec<StageLogEntry>,
    ) -> String {
        let request = PlannerRequest::new(prompt)
            .with_system("You are the navigation module of a memory substrate.");

        match tokio::time::timeout(self.config.model_timeout, self.planner.complete(&request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                // Planner loss terminates the stage loop, never the cycle.
                self.log(
                    logs,
                    stage,
                    round,
                    StageLogKind::System,
                    format!("planner error treated as empty output: {error}"),
                    vec![],
                );
                String::new()
            }
            Err(_) => {
                self.log(
                    logs,
                    stage,
                    round,
                    StageLogKind::System,
                    "planner call timed out",
                    vec![],
                );
                String::new()
            }
        }
    }

    fn resolve_node(&self, path: &str) -> Option<ConceptNode> {
        let id = extract_node_id(path)?;
        self.graph.read_node(&id).ok()
    }

    /// `Ok(None)` for recoverable misses; `Err` for storage loss.
    fn resolve_record(&self, path: &str) -> Result<Option<Record>, SandboxError> {
        let Some(id) = extract_record_id(path) else {
            return Ok(None);
        };
        match self.store.read(&id) {
            Ok(record) => Ok(Some(record)),
            Err(error) if error.is_recoverable() => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn budget_exceeded(&self, started: Instant) -> bool {
        started.elapsed() > self.config.sandbox_budget
    }

    fn failed_outcome(
        &self,
        utterance: &str,
        logs: Vec<StageLogEntry>,
        notes: Vec<String>,
        nav_failures: u32,
    ) -> SandboxOutcome {
        SandboxOutcome {
            state: SandboxState::Failed,
            bundle: ContextBundle::minimal(utterance, "sandbox budget exceeded"),
            logs,
            nav_failures,
            notes,
        }
    }

    fn log(
        &self,
        logs: &mut Vec<StageLogEntry>,
        stage: StageId,
        round: usize,
        kind: StageLogKind,
        message: impl Into<String>,
        paths: Vec<String>,
    ) {
        logs.push(StageLogEntry {
            stage,
            round,
            timestamp: self.clock.now(),
            kind,
            message: message.into(),
            paths,
        });
    }
}

// =============================================================================
// Output Parsing
// =============================================================================

/// Split planner output into path lines and `note:` lines.
#[must_use]
pub fn parse_planner_lines(text: &str) -> (Vec<String>, Vec<String>) {
    let mut paths = Vec::new();
    let mut notes = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(note) = line
            .strip_prefix("note:")
            .or_else(|| line.strip_prefix("Note:"))
        {
            notes.push(note.trim().to_string());
        } else {
            paths.push(line.to_string());
        }
    }
    (paths, notes)
}

/// Extract a node id from a bare id or a document path.
#[must_use]
pub fn extract_node_id(path: &str) -> Option<NodeId> {
    let tail = path.rsplit('/').next().unwrap_or(path);
    let tail = tail.strip_suffix(".json").unwrap_or(tail);
    NodeId::parse(tail).ok()
}

/// Extract a record id from a bare id or a content-file path.
#[must_use]
pub fn extract_record_id(path: &str) -> Option<RecordId> {
    let tail = path.rsplit('/').next().unwrap_or(path);
    let tail = tail.strip_suffix(".txt").unwrap_or(tail);
    RecordId::parse(tail).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ScriptedPlanner;
    use crate::store::record::Tier;
    use crate::store::CreateRecord;
    use chrono::TimeZone;
    use mnema_core::sim::SimClock;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<RecordStore>,
        graph: Arc<GraphStore>,
        journal: Arc<Journal>,
        clock: Clock,
        config: SubstrateConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let clock = Clock::Sim(SimClock::at_datetime(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let journal = Arc::new(Journal::open(dir.path(), clock.clone()).unwrap());
        let store = Arc::new(
            RecordStore::open(dir.path(), clock.clone(), Arc::clone(&journal), 70).unwrap(),
        );
        let graph =
            Arc::new(GraphStore::open(dir.path(), clock.clone(), Arc::clone(&journal)).unwrap());
        Fixture {
            _dir: dir,
            store,
            graph,
            journal,
            clock,
            config: SubstrateConfig::default(),
        }
    }

    fn sandbox(f: &Fixture, planner: ScriptedPlanner) -> Sandbox<ScriptedPlanner> {
        Sandbox::new(
            planner,
            Arc::clone(&f.store),
            Arc::clone(&f.graph),
            Arc::clone(&f.journal),
            f.clock.clone(),
            f.config.clone(),
        )
    }

    #[test]
    fn test_parse_planner_lines() {
        let (paths, notes) = parse_planner_lines("1\n1.3\n1.1\nnote: tier chain looks right\n");
        assert_eq!(paths, vec!["1", "1.3", "1.1"]);
        assert_eq!(notes, vec!["tier chain looks right"]);
    }

    #[test]
    fn test_extract_ids_from_paths() {
        assert_eq!(extract_node_id("1.2").unwrap().as_str(), "1.2");
        assert_eq!(extract_node_id("graph/1/1.2.json").unwrap().as_str(), "1.2");
        assert!(extract_node_id("graph/root.json").is_none());

        let raw = "working/2026/03/01/M3_20260301090000000_ab12cd.txt";
        assert_eq!(
            extract_record_id(raw).unwrap().as_str(),
            "M3_20260301090000000_ab12cd"
        );
        assert!(extract_record_id("not-an-id").is_none());
    }

    #[tokio::test]
    async fn test_navigation_with_missing_path() {
        let f = fixture();
        let n1 = f.graph.create_node(None, "memory systems", 80).unwrap();
        f.graph.create_node(Some(&n1), "tiers", 75).unwrap(); // 1.1
        f.graph.create_node(Some(&n1), "decay", 75).unwrap(); // 1.2

        let planner = ScriptedPlanner::with_responses(["1\n1.3\n1.1", "", ""]);
        let sandbox = sandbox(&f, planner);
        let outcome = sandbox.run("what is decay").await.unwrap();

        assert_eq!(outcome.state, SandboxState::Done);
        assert_eq!(outcome.bundle.path, vec!["1", "1.1"]);
        assert_eq!(outcome.nav_failures, 1);
        assert_eq!(f.store.counters().nav_fail_counter, 1);

        let errors: Vec<&StageLogEntry> = outcome
            .logs
            .iter()
            .filter(|e| e.kind == StageLogKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].paths.contains(&"1.3".to_string()));
    }

    #[tokio::test]
    async fn test_full_walk_collects_records() {
        let f = fixture();
        let node = f.graph.create_node(None, "concurrency", 80).unwrap();
        let record_id = f
            .store
            .create(
                CreateRecord::new("writers serialize through a lease", Tier::Classified)
                    .with_confidence(85),
            )
            .unwrap();
        let meta = f.store.get_meta(&record_id).unwrap();
        f.graph
            .attach_summary(
                &node,
                crate::graph::MemorySummary {
                    record_id: record_id.as_str().to_string(),
                    path: meta.rel_path.clone(),
                    summary: "write lease".to_string(),
                    tier: meta.tier,
                    value_level: meta.value_level(),
                    confidence: meta.confidence,
                },
            )
            .unwrap();

        let planner = ScriptedPlanner::with_responses([
            "1",                         // S1 round 1
            "",                          // S1 round 2: done
            record_id.as_str(),          // S2 round 1
            "",                          // S2 round 2: done
            "one-hop walk to the lease", // S3 note
        ]);
        let sandbox = sandbox(&f, planner);
        let outcome = sandbox.run("what is the write lease").await.unwrap();

        assert_eq!(outcome.state, SandboxState::Done);
        assert_eq!(outcome.bundle.memory_groups.core_group.len(), 1);
        assert_eq!(
            outcome.bundle.memory_groups.core_group[0].record_id,
            record_id.as_str()
        );
        assert_eq!(outcome.bundle.path_note, "one-hop walk to the lease");
        assert!(outcome.bundle.gaps.known_but_not_loaded.is_empty());
    }

    #[tokio::test]
    async fn test_unloaded_summary_becomes_gap() {
        let f = fixture();
        let node = f.graph.create_node(None, "concurrency", 80).unwrap();
        f.graph
            .attach_summary(
                &node,
                crate::graph::MemorySummary {
                    record_id: "M2_20260301080000000_ab12cd".to_string(),
                    path: String::new(),
                    summary: "never loaded".to_string(),
                    tier: Tier::Classified,
                    value_level: crate::store::record::ValueLevel::Medium,
                    confidence: 60,
                },
            )
            .unwrap();

        let planner = ScriptedPlanner::with_responses(["1", "", "", ""]);
        let sandbox = sandbox(&f, planner);
        let outcome = sandbox.run("what is concurrency").await.unwrap();

        assert_eq!(outcome.bundle.gaps.known_but_not_loaded.len(), 1);
        assert_eq!(
            outcome.bundle.confidence_assessment.level,
            ConfidenceLevel::Low
        );
    }

    #[tokio::test]
    async fn test_round_cap_stops_looping_planner() {
        let f = fixture();
        f.graph.create_node(None, "root concept", 80).unwrap();

        // The planner keeps emitting the same path forever.
        let responses: Vec<String> = (0..20).map(|_| "1".to_string()).collect();
        let planner = ScriptedPlanner::with_responses(responses);
        let sandbox = sandbox(&f, planner);
        let outcome = sandbox.run("loop").await.unwrap();

        assert_eq!(outcome.state, SandboxState::Done);
        let s1_inputs = outcome
            .logs
            .iter()
            .filter(|e| e.stage == StageId::S1Nav && e.kind == StageLogKind::Input)
            .count();
        assert_eq!(s1_inputs, SubstrateConfig::default().max_rounds_per_stage);
    }

    #[tokio::test]
    async fn test_zero_budget_fails_with_minimal_bundle() {
        let mut f = fixture();
        f.config = f.config.with_sandbox_budget(Duration::ZERO);
        let planner = ScriptedPlanner::with_responses(["1"]);
        let sandbox = sandbox(&f, planner);

        let outcome = sandbox.run("anything").await.unwrap();
        assert_eq!(outcome.state, SandboxState::Failed);
        assert_eq!(
            outcome.bundle.confidence_assessment.level,
            ConfidenceLevel::Low
        );
        assert!(outcome
            .bundle
            .confidence_assessment
            .risks
            .iter()
            .any(|r| r.contains("budget")));
    }

    #[tokio::test]
    async fn test_stage_journal_entries() {
        let f = fixture();
        let planner = ScriptedPlanner::new();
        let sandbox = sandbox(&f, planner);
        sandbox.run("anything").await.unwrap();

        let kinds: Vec<JournalKind> = f
            .journal
            .read_today()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        let begins = kinds.iter().filter(|k| **k == JournalKind::StageBegin).count();
        let ends = kinds.iter().filter(|k| **k == JournalKind::StageEnd).count();
        assert_eq!(begins, 3);
        assert_eq!(ends, 3);
    }
}
