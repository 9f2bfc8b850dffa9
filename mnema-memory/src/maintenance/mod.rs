//! Maintenance Pipeline
//!
//! Opportunistic reorganization through a fixed five-stage review chain:
//! question-output → analysis → review → organize → format-review. Stages
//! 1-4 are planner-driven; stage 5 is the deterministic schema gate. A
//! fail-major verdict loops back to stage 1 at most twice per run; fail-fatal
//! aborts with nothing committed.

pub mod plan;
pub mod prompts;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use mnema_core::sim::DeterministicRng;

use crate::clock::Clock;
use crate::config::SubstrateConfig;
use crate::constants::{
    ASSOCIATION_WEIGHT_DEFAULT, CONFIDENCE_PROMOTION_DELTA, COORDINATOR_RATING_LOW_THRESHOLD,
    MAINTENANCE_CANDIDATES_COUNT_MAX, MAINTENANCE_RETRY_COUNT_MAX,
};
use crate::graph::{GraphError, GraphStore, NodeId};
use crate::journal::{Journal, JournalKind};
use crate::planner::{PlannerProvider, PlannerRequest};
use crate::store::error::StoreError;
use crate::store::record::{clamp_confidence, MetadataPatch, RecordId, RecordMeta, Tier};
use crate::store::{CreateRecord, RecordFilter, RecordStore};

use self::plan::{format_review, OrganizePlan};

// =============================================================================
// Tasks, Verdicts, Triggers
// =============================================================================

/// The maintenance task chosen for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceTask {
    /// Convert the working-memory backlog into classified records
    IntegrateWorking,
    /// Link candidate record pairs
    DiscoverAssociations,
    /// Downweight records connected to repeated navigation failures
    BiasAudit,
    /// Rewrite the prompt-template hints from recent scores
    RehearseStrategy,
    /// Merge or split concept nodes
    ReorganizeConcepts,
}

impl MaintenanceTask {
    /// All tasks, in weighted-random order.
    pub const ALL: [MaintenanceTask; 5] = [
        MaintenanceTask::IntegrateWorking,
        MaintenanceTask::DiscoverAssociations,
        MaintenanceTask::BiasAudit,
        MaintenanceTask::RehearseStrategy,
        MaintenanceTask::ReorganizeConcepts,
    ];

    /// Task name for prompts and journaling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntegrateWorking => "integrate_working",
            Self::DiscoverAssociations => "discover_associations",
            Self::BiasAudit => "bias_audit",
            Self::RehearseStrategy => "rehearse_strategy",
            Self::ReorganizeConcepts => "reorganize_concepts",
        }
    }
}

/// Stage-3 verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewVerdict {
    /// Proceed
    Pass,
    /// Proceed with an annotation
    FailMinor,
    /// Return to stage 1
    FailMajor,
    /// Abort the run
    FailFatal,
}

impl ReviewVerdict {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pass" => Some(Self::Pass),
            "fail-minor" => Some(Self::FailMinor),
            "fail-major" => Some(Self::FailMajor),
            "fail-fatal" => Some(Self::FailFatal),
            _ => None,
        }
    }
}

/// Inputs to the trigger rule.
#[derive(Debug, Clone, Default)]
pub struct TriggerState {
    /// Seconds since last activity
    pub idle_secs: u64,
    /// Current tier-3 record count
    pub working_backlog: usize,
    /// Navigation failures since the last audit
    pub nav_failures: u32,
    /// Most recent self-rating, if any
    pub last_rating: Option<f64>,
}

/// Evaluate the trigger rules, picking at most one task.
///
/// Backlog and navigation failures force their tasks; plain idleness picks
/// by weighted random, leaning toward strategy rehearsal when the
/// self-rating is poor.
#[must_use]
pub fn pick_task(
    state: &TriggerState,
    config: &SubstrateConfig,
    rng: &mut DeterministicRng,
) -> Option<MaintenanceTask> {
    if state.working_backlog >= config.backlog_threshold {
        return Some(MaintenanceTask::IntegrateWorking);
    }
    if state.nav_failures >= config.navfail_threshold {
        return Some(MaintenanceTask::BiasAudit);
    }
    if state.idle_secs < config.idle_trigger.as_secs() {
        return None;
    }

    let rating_low = state
        .last_rating
        .is_some_and(|rating| rating < COORDINATOR_RATING_LOW_THRESHOLD);
    let mut weights = [3.0, 2.0, 1.0, 1.0, 2.0];
    if rating_low {
        weights[3] = 4.0;
    }
    Some(MaintenanceTask::ALL[rng.choose_weighted(&weights)])
}

// =============================================================================
// Errors and Reports
// =============================================================================

/// Errors from a maintenance run. Planner-verdict aborts are reported in the
/// [`MaintenanceReport`], not here.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// Record store failure
    #[error("record store: {0}")]
    Store(#[from] StoreError),

    /// Concept graph failure
    #[error("concept graph: {0}")]
    Graph(#[from] GraphError),
}

impl From<crate::links::LinkError> for MaintenanceError {
    fn from(error: crate::links::LinkError) -> Self {
        match error {
            crate::links::LinkError::Store(e) => Self::Store(e),
            crate::links::LinkError::Graph(e) => Self::Graph(e),
        }
    }
}

/// Stage-2 analysis shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    /// Ids of the material involved
    #[serde(default)]
    pub resources: Vec<String>,
    /// Observed problems
    #[serde(default)]
    pub issues: Vec<String>,
    /// One-sentence root cause
    #[serde(default)]
    pub root_cause: String,
    /// Concrete fix candidates
    #[serde(default)]
    pub candidate_fixes: Vec<String>,
}

/// Result of one maintenance run.
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    /// The task that ran
    pub task: MaintenanceTask,
    /// Whether a plan was committed
    pub committed: bool,
    /// Final review verdict, if the chain reached stage 3
    pub verdict: Option<ReviewVerdict>,
    /// Questions raised by stage 1
    pub questions: Vec<String>,
    /// Ids of records created by the commit
    pub records_created: Vec<String>,
    /// Ids of nodes created by the commit
    pub nodes_created: Vec<String>,
    /// Promotions applied
    pub promotions_applied: usize,
    /// Confidence adjustments applied
    pub adjustments_applied: usize,
    /// Association edges created
    pub associations_created: usize,
    /// Association edges dropped by pruning
    pub pruned_edges: usize,
    /// Why the run stopped early, if it did
    pub aborted: Option<String>,
}

impl MaintenanceReport {
    fn empty(task: MaintenanceTask) -> Self {
        Self {
            task,
            committed: false,
            verdict: None,
            questions: Vec::new(),
            records_created: Vec::new(),
            nodes_created: Vec::new(),
            promotions_applied: 0,
            adjustments_applied: 0,
            associations_created: 0,
            pruned_edges: 0,
            aborted: None,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// The five-stage maintenance chain.
pub struct MaintenancePipeline<P: PlannerProvider> {
    planner: P,
    store: Arc<RecordStore>,
    graph: Arc<GraphStore>,
    journal: Arc<Journal>,
    #[allow(dead_code)]
    clock: Clock,
    config: SubstrateConfig,
    cancelled: Arc<AtomicBool>,
}

impl<P: PlannerProvider> MaintenancePipeline<P> {
    /// Create a pipeline over the stores.
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
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cooperative cancellation. Setting it skips every stage
    /// after the one in flight.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Run one maintenance pass for the given task.
    ///
    /// # Errors
    /// Only backing-store failures; verdict aborts land in the report.
    #[tracing::instrument(skip(self), fields(task = task.as_str()))]
    pub async fn run(&self, task: MaintenanceTask) -> Result<MaintenanceReport, MaintenanceError> {
        self.journal
            .append(JournalKind::MaintenanceBegin, json!({"task": task.as_str()}));
        let mut report = MaintenanceReport::empty(task);

        let candidates = self.select_candidates(task);
        let candidates_render = prompts::render_candidates(&candidates);

        let mut retries = 0u32;
        let outcome = loop {
            if self.check_cancelled(&mut report) {
                break None;
            }

            // Stage 1: question output.
            let questions = self
                .stage_questions(task, &candidates_render)
                .await;
            report.questions.clone_from(&questions);
            if questions.is_empty() {
                report.aborted = Some("no questions raised".to_string());
                break None;
            }
            if self.check_cancelled(&mut report) {
                break None;
            }

            // Stage 2: analysis.
            let Some(analysis) = self
                .stage_analysis(task, &questions, &candidates_render)
                .await
            else {
                if retries < MAINTENANCE_RETRY_COUNT_MAX {
                    retries += 1;
                    continue;
                }
                report.aborted = Some("analysis did not parse".to_string());
                break None;
            };
            if self.check_cancelled(&mut report) {
                break None;
            }

            // Stage 3: review.
            let verdict = self.stage_review(task, &analysis).await;
            report.verdict = Some(verdict);
            match verdict {
                ReviewVerdict::FailFatal => {
                    report.aborted = Some("review verdict fail-fatal".to_string());
                    break None;
                }
                ReviewVerdict::FailMajor => {
                    if retries < MAINTENANCE_RETRY_COUNT_MAX {
                        retries += 1;
                        continue;
                    }
                    report.aborted = Some("review verdict fail-major, retries exhausted".to_string());
                    break None;
                }
                ReviewVerdict::Pass | ReviewVerdict::FailMinor => {}
            }
            if self.check_cancelled(&mut report) {
                break None;
            }

            // Stage 4: organize.
            let Some(plan) = self.stage_organize(task, &analysis).await else {
                if retries < MAINTENANCE_RETRY_COUNT_MAX {
                    retries += 1;
                    continue;
                }
                report.aborted = Some("organize plan did not parse".to_string());
                break None;
            };

            // Stage 5: format review (deterministic; no planner).
            self.journal
                .append(JournalKind::StageBegin, json!({"stage": "m5_format_review"}));
            let violations = format_review(&plan, &self.graph, &self.store);
            self.journal.append(
                JournalKind::StageEnd,
                json!({"stage": "m5_format_review", "violations": violations.len()}),
            );
            if !violations.is_empty() {
                report.verdict = Some(ReviewVerdict::FailFatal);
                report.aborted = Some(format!("format review rejected plan: {}", violations.join("; ")));
                break None;
            }

            break Some(plan);
        };

        if let Some(plan) = outcome {
            self.commit(task, &plan, &mut report)?;
            report.committed = true;
        }

        self.journal.append(
            JournalKind::MaintenanceEnd,
            json!({"task": task.as_str(), "committed": report.committed}),
        );
        Ok(report)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn stage_questions(&self, task: MaintenanceTask, candidates: &str) -> Vec<String> {
        self.journal
            .append(JournalKind::StageBegin, json!({"stage": "m1_question_output"}));
        let prompt = prompts::build_question_output(task.as_str(), candidates);
        let response = self.call_planner(prompt).await;
        let questions = parse_questions(&response);
        self.journal.append(
            JournalKind::StageEnd,
            json!({"stage": "m1_question_output", "questions": questions.len()}),
        );
        questions
    }

    async fn stage_analysis(
        &self,
        task: MaintenanceTask,
        questions: &[String],
        candidates: &str,
    ) -> Option<Analysis> {
        self.journal
            .append(JournalKind::StageBegin, json!({"stage": "m2_analysis"}));
        let prompt = prompts::build_analysis(task.as_str(), &questions.join("\n"), candidates);
        let response = self.call_planner(prompt).await;
        let analysis = parse_json_lenient::<Analysis>(&response);
        self.journal.append(
            JournalKind::StageEnd,
            json!({"stage": "m2_analysis", "parsed": analysis.is_some()}),
        );
        analysis
    }

    async fn stage_review(&self, task: MaintenanceTask, analysis: &Analysis) -> ReviewVerdict {
        self.journal
            .append(JournalKind::StageBegin, json!({"stage": "m3_review"}));
        let rendered = serde_json::to_string_pretty(analysis).unwrap_or_default();
        let prompt = prompts::build_review(task.as_str(), &rendered);
        let response = self.call_planner(prompt).await;
        // An unreadable verdict aborts rather than committing blind.
        let verdict = parse_verdict(&response).unwrap_or(ReviewVerdict::FailFatal);
        self.journal.append(
            JournalKind::StageEnd,
            json!({"stage": "m3_review", "verdict": verdict}),
        );
        verdict
    }

    async fn stage_organize(
        &self,
        task: MaintenanceTask,
        analysis: &Analysis,
    ) -> Option<OrganizePlan> {
        self.journal
            .append(JournalKind::StageBegin, json!({"stage": "m4_organize"}));
        let rendered = serde_json::to_string_pretty(analysis).unwrap_or_default();
        let graph_render = self.render_graph();
        let prompt = prompts::build_organize(task.as_str(), &rendered, &graph_render);
        let response = self.call_planner(prompt).await;
        let plan = parse_json_lenient::<OrganizePlan>(&response);
        self.journal.append(
            JournalKind::StageEnd,
            json!({"stage": "m4_organize", "parsed": plan.is_some()}),
        );
        plan
    }

    // =========================================================================
    // Commit
    // =========================================================================

    fn commit(
        &self,
        task: MaintenanceTask,
        plan: &OrganizePlan,
        report: &mut MaintenanceReport,
    ) -> Result<(), MaintenanceError> {
        // Records first, so nodes can attach them by index.
        let mut created_ids: Vec<RecordId> = Vec::new();
        for plan_record in &plan.records {
            let tier = Tier::from_index(plan_record.tier)?;
            let mut request = CreateRecord::new(plan_record.content.clone(), tier)
                .with_tags(plan_record.tags.clone());
            if let Some(category) = &plan_record.category {
                request = request.with_category(category.clone());
            }
            if let Some(subcategory) = &plan_record.subcategory {
                request = request.with_subcategory(subcategory.clone());
            }
            if let Some(confidence) = plan_record.confidence {
                request = request.with_confidence(clamp_confidence(confidence));
            }
            let id = self.store.create(request)?;
            report.records_created.push(id.as_str().to_string());
            created_ids.push(id);
        }

        // Nodes, resolving `?` placeholders through the allocator.
        let mut id_map: Vec<(String, NodeId)> = Vec::new();
        for plan_node in &plan.nodes {
            let parent = plan::concrete_parent_prefix(&plan_node.id)
                .map(|prefix| NodeId::parse(&prefix))
                .transpose()?;
            let confidence = clamp_confidence(plan_node.confidence.unwrap_or(80));
            let node_id =
                self.graph
                    .create_node(parent.as_ref(), plan_node.content.clone(), confidence)?;
            report.nodes_created.push(node_id.as_str().to_string());
            id_map.push((plan_node.id.clone(), node_id.clone()));

            for index in &plan_node.attach_records {
                if let Some(record_id) = created_ids.get(*index) {
                    self.attach(&node_id, record_id)?;
                }
            }
        }

        // Record-side attachments, honoring placeholder targets.
        for (plan_record, record_id) in plan.records.iter().zip(created_ids.iter()) {
            for target in &plan_record.attach_to {
                let node_id = id_map
                    .iter()
                    .find(|(raw, _)| raw == target)
                    .map(|(_, id)| id.clone())
                    .or_else(|| NodeId::parse(target).ok());
                match node_id.filter(|id| self.graph.exists(id)) {
                    Some(node_id) => self.attach(&node_id, record_id)?,
                    None => tracing::warn!(target, "attach target missing, skipped"),
                }
            }
        }

        // Promotions adjust confidence upward by the fixed delta.
        for promotion in &plan.promotions {
            let id = RecordId::parse(&promotion.record_id)?;
            let to_tier = Tier::from_index(promotion.to_tier)?;
            let Some(meta) = self.store.get_meta(&id) else {
                continue;
            };
            let confidence =
                clamp_confidence(i64::from(meta.confidence) + i64::from(CONFIDENCE_PROMOTION_DELTA));
            self.store.relocate(&id, to_tier, confidence)?;
            report.promotions_applied += 1;
        }

        for adjustment in &plan.adjustments {
            let id = RecordId::parse(&adjustment.record_id)?;
            let Some(meta) = self.store.get_meta(&id) else {
                continue;
            };
            let confidence = clamp_confidence(i64::from(meta.confidence) + adjustment.delta);
            self.store
                .update_metadata(&id, MetadataPatch::new().with_confidence(confidence))?;
            report.adjustments_applied += 1;
        }

        for association in &plan.associations {
            let source = RecordId::parse(&association.source)?;
            let target = RecordId::parse(&association.target)?;
            let relation = association.relation.clone().unwrap_or_else(|| "related".to_string());
            let weight = association.weight.unwrap_or(ASSOCIATION_WEIGHT_DEFAULT);
            self.store
                .create_association(&source, &target, relation, weight)?;
            report.associations_created += 1;
        }

        // Cycle-marked edges drop here, never during traversal.
        if plan.prune_associations || task == MaintenanceTask::DiscoverAssociations {
            report.pruned_edges = self.store.apply_association_pruning()?;
        }

        if let Some(hints) = &plan.strategy_hints {
            let hints = hints.clone();
            self.store
                .with_navigation(move |nav| nav.strategy_hints = Some(hints))?;
        }

        // A bias audit consumes the failure counter it was triggered by.
        if task == MaintenanceTask::BiasAudit {
            self.store.update_counters(|c| c.nav_fail_counter = 0)?;
        }

        Ok(())
    }

    fn attach(&self, node_id: &NodeId, record_id: &RecordId) -> Result<(), MaintenanceError> {
        if self.store.get_meta(record_id).is_none() {
            return Ok(());
        }
        crate::links::attach_record(&self.graph, &self.store, node_id, record_id, None)?;
        Ok(())
    }

    // =========================================================================
    // Candidate Selection
    // =========================================================================

    fn select_candidates(&self, task: MaintenanceTask) -> Vec<RecordMeta> {
        let cap = MAINTENANCE_CANDIDATES_COUNT_MAX;
        match task {
            MaintenanceTask::IntegrateWorking => {
                let mut metas = self.store.list(&RecordFilter::new().with_tier(Tier::Working));
                metas.truncate(cap);
                metas
            }
            MaintenanceTask::DiscoverAssociations | MaintenanceTask::RehearseStrategy => {
                let mut metas = self.store.list(&RecordFilter::new());
                metas.sort_by(|a, b| b.access_count.cmp(&a.access_count));
                metas.truncate(cap);
                metas
            }
            MaintenanceTask::BiasAudit => {
                let mut seen = BTreeSet::new();
                let mut metas = Vec::new();
                for path in self.store.navigation().recent_nav_failures {
                    let Some(node_id) = crate::sandbox::extract_node_id(&path) else {
                        continue;
                    };
                    let Ok(node) = self.graph.read_node(&node_id) else {
                        continue;
                    };
                    for summary in node.memory_summaries {
                        if !seen.insert(summary.record_id.clone()) {
                            continue;
                        }
                        if let Ok(id) = RecordId::parse(&summary.record_id) {
                            if let Some(meta) = self.store.get_meta(&id) {
                                metas.push(meta);
                            }
                        }
                    }
                }
                metas.truncate(cap);
                metas
            }
            MaintenanceTask::ReorganizeConcepts => {
                // Records on the most crowded nodes.
                let mut nodes = self.graph.all_nodes();
                nodes.sort_by_key(|n| std::cmp::Reverse(n.memory_summaries.len()));
                let mut metas = Vec::new();
                for node in nodes.into_iter().take(3) {
                    for summary in node.memory_summaries {
                        if let Ok(id) = RecordId::parse(&summary.record_id) {
                            if let Some(meta) = self.store.get_meta(&id) {
                                metas.push(meta);
                            }
                        }
                    }
                }
                metas.truncate(cap);
                metas
            }
        }
    }

    fn render_graph(&self) -> String {
        let nodes = self.graph.all_nodes();
        if nodes.is_empty() {
            return "(the graph is empty)".to_string();
        }
        nodes
            .iter()
            .map(|n| {
                format!(
                    "{}: {} ({} children, {} records)",
                    n.id,
                    n.content,
                    n.child_refs.len(),
                    n.memory_summaries.len()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn call_planner(&self, prompt: String) -> String {
        let request = PlannerRequest::new(prompt)
            .with_system("You are the maintenance module of a memory substrate.");
        match tokio::time::timeout(self.config.model_timeout, self.planner.complete(&request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                tracing::warn!(%error, "planner error during maintenance stage");
                String::new()
            }
            Err(_) => {
                tracing::warn!("planner timeout during maintenance stage");
                String::new()
            }
        }
    }

    fn check_cancelled(&self, report: &mut MaintenanceReport) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            report.aborted = Some("cancelled at stage boundary".to_string());
            true
        } else {
            false
        }
    }
}

// =============================================================================
// Output Parsing
// =============================================================================

/// Parse `question:` lines from stage-1 output.
#[must_use]
pub fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("question:")
                .or_else(|| line.strip_prefix("Question:"))
        })
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Parse the stage-3 verdict line.
#[must_use]
pub fn parse_verdict(text: &str) -> Option<ReviewVerdict> {
    text.lines().find_map(|line| {
        let line = line.trim();
        line.strip_prefix("verdict:")
            .or_else(|| line.strip_prefix("Verdict:"))
            .and_then(ReviewVerdict::parse)
    })
}

/// Parse a JSON object out of planner output, tolerating code fences and
/// surrounding prose.
#[must_use]
pub fn parse_json_lenient<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemorySummary;
    use crate::planner::ScriptedPlanner;
    use chrono::{TimeZone, Utc};
    use mnema_core::sim::SimClock;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<RecordStore>,
        graph: Arc<GraphStore>,
        journal: Arc<Journal>,
        clock: Clock,
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
        }
    }

    fn pipeline(f: &Fixture, planner: ScriptedPlanner) -> MaintenancePipeline<ScriptedPlanner> {
        MaintenancePipeline::new(
            planner,
            Arc::clone(&f.store),
            Arc::clone(&f.graph),
            Arc::clone(&f.journal),
            f.clock.clone(),
            SubstrateConfig::default(),
        )
    }

    const ANALYSIS_JSON: &str = r#"{"resources": ["M3_a"], "issues": ["backlog"],
        "root_cause": "working records pile up", "candidate_fixes": ["integrate"]}"#;

    #[test]
    fn test_parse_questions() {
        let questions = parse_questions(
            "question: which records belong together?\nnoise\nQuestion: what category fits?\n",
        );
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("verdict: pass"), Some(ReviewVerdict::Pass));
        assert_eq!(
            parse_verdict("some prose\nverdict: fail-major\nreason: vague"),
            Some(ReviewVerdict::FailMajor)
        );
        assert_eq!(parse_verdict("no verdict here"), None);
    }

    #[test]
    fn test_parse_json_lenient_with_fences() {
        let wrapped = format!("```json\n{ANALYSIS_JSON}\n```");
        let analysis: Analysis = parse_json_lenient(&wrapped).unwrap();
        assert_eq!(analysis.resources, vec!["M3_a"]);
    }

    #[test]
    fn test_pick_task_forced_triggers() {
        let config = SubstrateConfig::default();
        let mut rng = DeterministicRng::new(42);

        let state = TriggerState {
            working_backlog: 10,
            ..TriggerState::default()
        };
        assert_eq!(
            pick_task(&state, &config, &mut rng),
            Some(MaintenanceTask::IntegrateWorking)
        );

        let state = TriggerState {
            nav_failures: 3,
            ..TriggerState::default()
        };
        assert_eq!(
            pick_task(&state, &config, &mut rng),
            Some(MaintenanceTask::BiasAudit)
        );

        let state = TriggerState::default();
        assert_eq!(pick_task(&state, &config, &mut rng), None);

        let state = TriggerState {
            idle_secs: 200,
            ..TriggerState::default()
        };
        assert!(pick_task(&state, &config, &mut rng).is_some());
    }

    #[tokio::test]
    async fn test_full_chain_promotes_working_records() {
        let f = fixture();
        let working: Vec<RecordId> = (0..3)
            .map(|i| {
                f.store
                    .create(CreateRecord::new(format!("observation {i}"), Tier::Working))
                    .unwrap()
            })
            .collect();

        let organize = format!(
            r#"{{"records": [{{"content": "merged insight from the backlog", "tier": 2,
                 "confidence": 75, "attach_to": ["1.?"]}}],
                "nodes": [{{"id": "?", "content": "recurring observations", "confidence": 80,
                 "attach_records": [0]}}],
                "promotions": [{{"record_id": "{}", "to_tier": 2}}]}}"#,
            working[0].as_str()
        );
        let planner = ScriptedPlanner::with_responses([
            "question: can the backlog be merged?".to_string(),
            ANALYSIS_JSON.to_string(),
            "verdict: pass".to_string(),
            organize,
        ]);

        let report = pipeline(&f, planner)
            .run(MaintenanceTask::IntegrateWorking)
            .await
            .unwrap();

        assert!(report.committed);
        assert_eq!(report.verdict, Some(ReviewVerdict::Pass));
        assert_eq!(report.records_created.len(), 1);
        assert_eq!(report.nodes_created, vec!["1"]);
        assert_eq!(report.promotions_applied, 1);

        // The promoted record moved to tier 2 with +10 confidence.
        let meta = f.store.get_meta(&working[0]).unwrap();
        assert_eq!(meta.tier, Tier::Classified);
        assert_eq!(meta.confidence, 80);
        assert!(meta.rel_path.starts_with("classified/high/"));

        // Back-reference completeness for the new record.
        let new_id = RecordId::parse(&report.records_created[0]).unwrap();
        let new_meta = f.store.get_meta(&new_id).unwrap();
        assert!(new_meta.nng_refs.contains("1"));
        let node = f.graph.read_node(&NodeId::parse("1").unwrap()).unwrap();
        assert!(node
            .memory_summaries
            .iter()
            .any(|s| s.record_id == new_id.as_str()));
    }

    #[tokio::test]
    async fn test_format_review_rejects_leading_zero_plan() {
        let f = fixture();
        f.store
            .create(CreateRecord::new("anything", Tier::Working))
            .unwrap();

        let planner = ScriptedPlanner::with_responses([
            "question: anything to fix?",
            ANALYSIS_JSON,
            "verdict: pass",
            r#"{"nodes": [{"id": "01.2", "content": "bad id", "confidence": 80}]}"#,
        ]);

        let report = pipeline(&f, planner)
            .run(MaintenanceTask::ReorganizeConcepts)
            .await
            .unwrap();

        assert!(!report.committed);
        assert_eq!(report.verdict, Some(ReviewVerdict::FailFatal));
        assert!(report.aborted.as_deref().unwrap().contains("format review"));
        assert_eq!(f.graph.node_count(), 0, "no mutations were committed");
    }

    #[tokio::test]
    async fn test_fail_major_retries_then_aborts() {
        let f = fixture();
        f.store
            .create(CreateRecord::new("anything", Tier::Working))
            .unwrap();

        // Three attempts (initial + two retries), each failing review.
        let mut responses = Vec::new();
        for _ in 0..3 {
            responses.push("question: something".to_string());
            responses.push(ANALYSIS_JSON.to_string());
            responses.push("verdict: fail-major".to_string());
        }
        let planner = ScriptedPlanner::with_responses(responses);
        let pipeline = pipeline(&f, planner);

        let report = pipeline.run(MaintenanceTask::IntegrateWorking).await.unwrap();

        assert!(!report.committed);
        assert_eq!(report.verdict, Some(ReviewVerdict::FailMajor));
        assert!(report.aborted.as_deref().unwrap().contains("retries exhausted"));
        assert_eq!(pipeline.planner.remaining(), 0, "all three attempts ran");
    }

    #[tokio::test]
    async fn test_no_questions_ends_quietly() {
        let f = fixture();
        let planner = ScriptedPlanner::with_responses([""]);
        let report = pipeline(&f, planner)
            .run(MaintenanceTask::BiasAudit)
            .await
            .unwrap();

        assert!(!report.committed);
        assert!(report.aborted.as_deref().unwrap().contains("no questions"));
    }

    #[tokio::test]
    async fn test_bias_audit_downweights_and_resets_counter() {
        let f = fixture();
        let node = f.graph.create_node(None, "confusing area", 80).unwrap();
        let record = f
            .store
            .create(CreateRecord::new("misleading note", Tier::Classified).with_confidence(60))
            .unwrap();
        let meta = f.store.get_meta(&record).unwrap();
        f.graph
            .attach_summary(
                &node,
                MemorySummary {
                    record_id: record.as_str().to_string(),
                    path: meta.rel_path.clone(),
                    summary: "misleading".to_string(),
                    tier: meta.tier,
                    value_level: meta.value_level(),
                    confidence: meta.confidence,
                },
            )
            .unwrap();

        // Three failures pointing at a child of the confusing node.
        for _ in 0..3 {
            f.store.record_nav_failure("1.9");
        }
        assert_eq!(f.store.counters().nav_fail_counter, 3);

        let adjust = format!(
            r#"{{"adjustments": [{{"record_id": "{}", "delta": -10}}]}}"#,
            record.as_str()
        );
        let planner = ScriptedPlanner::with_responses([
            "question: is this record misleading?".to_string(),
            ANALYSIS_JSON.to_string(),
            "verdict: fail-minor".to_string(),
            adjust,
        ]);

        let report = pipeline(&f, planner)
            .run(MaintenanceTask::BiasAudit)
            .await
            .unwrap();

        assert!(report.committed);
        assert_eq!(report.adjustments_applied, 1);
        assert_eq!(f.store.get_meta(&record).unwrap().confidence, 50);
        assert_eq!(f.store.counters().nav_fail_counter, 0, "audit consumed the counter");
    }

    #[tokio::test]
    async fn test_cancellation_at_stage_boundary() {
        let f = fixture();
        let planner = ScriptedPlanner::with_responses(["question: anything?"]);
        let pipeline = pipeline(&f, planner);
        pipeline.cancel_handle().store(true, Ordering::SeqCst);

        let report = pipeline.run(MaintenanceTask::IntegrateWorking).await.unwrap();
        assert!(!report.committed);
        assert!(report.aborted.as_deref().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_strategy_hints_stored() {
        let f = fixture();
        let planner = ScriptedPlanner::with_responses([
            "question: are prompts effective?",
            ANALYSIS_JSON,
            "verdict: pass",
            r#"{"strategy_hints": "start navigation from the tier concepts"}"#,
        ]);

        let report = pipeline(&f, planner)
            .run(MaintenanceTask::RehearseStrategy)
            .await
            .unwrap();

        assert!(report.committed);
        assert_eq!(
            f.store.navigation().strategy_hints.as_deref(),
            Some("start navigation from the tier concepts")
        );
    }
}
