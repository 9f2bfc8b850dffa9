//! Coordinator
//!
//! The single entity sequencing exchanges: it owns the stores, the planner
//! handle, the journal and the counters. One foreground cycle runs at a
//! time; maintenance runs opportunistically in the gaps and never overlaps
//! itself. Shutdown drains the active cycle and persists counters; failure
//! to persist at shutdown is the one fatal error.

pub mod command;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;
use thiserror::Error;

use mnema_core::sim::DeterministicRng;

use crate::backup;
use crate::clock::Clock;
use crate::config::SubstrateConfig;
use crate::constants::COORDINATOR_RATING_WEIGHTS;
use crate::graph::{GraphError, GraphStore, NodeId};
use crate::journal::Journal;
use crate::links::{self, LinkError};
use crate::maintenance::{
    pick_task, MaintenanceError, MaintenancePipeline, MaintenanceReport, MaintenanceTask,
    TriggerState,
};
use crate::planner::{PlannerError, PlannerProvider, PlannerRequest};
use crate::retrieval::{RetrievalEngine, SearchOptions};
use crate::sandbox::{ContextBundle, Sandbox, SandboxError, SandboxState, StageLogEntry};
use crate::store::error::StoreError;
use crate::store::record::{validate_confidence, RecordId, Tier};
use crate::store::{CreateRecord, RecordFilter, RecordStore};

pub use self::command::{parse_command, Command, CommandParseError, CommandResponse};

// =============================================================================
// Errors and Outcomes
// =============================================================================

/// Errors surfaced by the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Record store failure
    #[error("record store: {0}")]
    Store(#[from] StoreError),

    /// Concept graph failure
    #[error("concept graph: {0}")]
    Graph(#[from] GraphError),

    /// Sandbox failure after the retry
    #[error("sandbox: {0}")]
    Sandbox(#[from] SandboxError),

    /// Maintenance failure
    #[error("maintenance: {0}")]
    Maintenance(#[from] MaintenanceError),
}

impl From<LinkError> for CoordinatorError {
    fn from(error: LinkError) -> Self {
        match error {
            LinkError::Store(e) => Self::Store(e),
            LinkError::Graph(e) => Self::Graph(e),
        }
    }
}

/// Result of one full exchange.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Terminal sandbox state
    pub state: SandboxState,
    /// The context bundle handed to the external model
    pub bundle: ContextBundle,
    /// Free-text part of the model reply
    pub reply: String,
    /// Responses to the tool commands the model issued
    pub command_responses: Vec<CommandResponse>,
    /// Per-stage sandbox log entries (the diagnostic field of the reply
    /// bundle)
    pub diagnostics: Vec<StageLogEntry>,
}

// =============================================================================
// Coordinator
// =============================================================================

const REPLY_SYSTEM: &str = "You are the interaction surface of a memory substrate. Ground your \
reply in the context bundle. To operate the substrate, emit one JSON command \
per line: {\"action\": \"store_memory\" | \"retrieve_memory\" | \
\"create_association\" | \"get_status\" | \"cleanup\" | \"backup\", \
\"params\": {...}}. Lines that are not commands become the reply text.";

/// Cycle management and external command dispatch.
pub struct Coordinator<P: PlannerProvider + Clone> {
    config: SubstrateConfig,
    clock: Clock,
    journal: Arc<Journal>,
    store: Arc<RecordStore>,
    graph: Arc<GraphStore>,
    retrieval: RetrievalEngine,
    sandbox: Sandbox<P>,
    maintenance: MaintenancePipeline<P>,
    planner: P,
    cycle_lock: tokio::sync::Mutex<()>,
    maintenance_lock: tokio::sync::Mutex<()>,
    rng: Mutex<DeterministicRng>,
}

impl<P: PlannerProvider + Clone> Coordinator<P> {
    /// Open a substrate rooted at `root`.
    ///
    /// First run creates the tier layout, the graph directory with an empty
    /// `root.json`, and the journal directory.
    ///
    /// # Errors
    /// Returns storage errors from layout creation or state loading.
    pub fn open(
        root: impl Into<PathBuf>,
        planner: P,
        config: SubstrateConfig,
        clock: Clock,
    ) -> Result<Self, CoordinatorError> {
        let root = root.into();
        let journal =
            Arc::new(Journal::open(&root, clock.clone()).map_err(StoreError::from)?);
        let store = Arc::new(RecordStore::open(
            &root,
            clock.clone(),
            Arc::clone(&journal),
            config.confidence_default_new,
        )?);
        let graph = Arc::new(GraphStore::open(&root, clock.clone(), Arc::clone(&journal))?);
        let retrieval =
            RetrievalEngine::new(Arc::clone(&store)).with_default_limit(config.retrieval_limit);
        let sandbox = Sandbox::new(
            planner.clone(),
            Arc::clone(&store),
            Arc::clone(&graph),
            Arc::clone(&journal),
            clock.clone(),
            config.clone(),
        );
        let maintenance = MaintenancePipeline::new(
            planner.clone(),
            Arc::clone(&store),
            Arc::clone(&graph),
            Arc::clone(&journal),
            clock.clone(),
            config.clone(),
        );

        let rng = Mutex::new(DeterministicRng::new(clock.now_ms()));
        let coordinator = Self {
            config,
            clock,
            journal,
            store,
            graph,
            retrieval,
            sandbox,
            maintenance,
            planner,
            cycle_lock: tokio::sync::Mutex::new(()),
            maintenance_lock: tokio::sync::Mutex::new(()),
            rng,
        };
        coordinator.touch_activity();
        Ok(coordinator)
    }

    /// The record store.
    #[must_use]
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// The concept graph.
    #[must_use]
    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    /// The retrieval engine.
    #[must_use]
    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    /// The operation journal.
    #[must_use]
    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    // =========================================================================
    // The Cycle
    // =========================================================================

    /// Process one exchange start-to-end. Concurrent callers queue.
    ///
    /// # Errors
    /// Unrecoverable backing-store failures (the sandbox is retried once
    /// first). Counters survive an aborted cycle.
    #[tracing::instrument(skip(self, utterance))]
    pub async fn run_cycle(&self, utterance: &str) -> Result<CycleOutcome, CoordinatorError> {
        let _guard = self.cycle_lock.lock().await;
        self.touch_activity();

        // The sandbox gets one retry on unrecoverable failure.
        let outcome = match self.sandbox.run(utterance).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%error, "sandbox failed, retrying once");
                self.sandbox.run(utterance).await?
            }
        };

        // Hand the bundle to the external model.
        let reply_raw = self.request_reply(utterance, &outcome.bundle).await;

        // Execute tool commands; the rest is reply text.
        let mut command_responses = Vec::new();
        let mut reply_lines = Vec::new();
        for line in reply_raw.lines() {
            match parse_command(line) {
                Ok(command) => {
                    let response = self.execute_command(command).await;
                    command_responses.push(response);
                }
                Err(CommandParseError::NotACommand) => {
                    if !line.trim().is_empty() {
                        reply_lines.push(line.trim().to_string());
                    }
                }
                Err(CommandParseError::Malformed(message)) => {
                    command_responses.push(CommandResponse::error("parse", message));
                }
            }
        }
        let reply = reply_lines.join("\n");

        // Append a working-memory record of the exchange.
        let exchange = format!("user: {utterance}\nreply: {reply}");
        if let Err(error) = self.store.create(
            CreateRecord::new(exchange, Tier::Working).with_category("exchange"),
        ) {
            tracing::warn!(%error, "exchange record not stored");
        }

        // Counters; every Nth cycle feeds the self-rating to the triggers.
        self.update_counters_best_effort(|c| {
            c.session_count += 1;
            c.cycles_since_rating += 1;
        });
        let counters = self.store.counters();
        if counters.cycles_since_rating >= self.config.rating_cycle_interval {
            let rating = self.self_rating();
            tracing::info!(rating, "self-rating computed");
            self.update_counters_best_effort(|c| {
                c.cycles_since_rating = 0;
                c.last_rating = Some(rating);
            });
        }

        Ok(CycleOutcome {
            state: outcome.state,
            bundle: outcome.bundle,
            reply,
            command_responses,
            diagnostics: outcome.logs,
        })
    }

    async fn request_reply(&self, utterance: &str, bundle: &ContextBundle) -> String {
        let bundle_json = match serde_json::to_string_pretty(bundle) {
            Ok(json) => json,
            Err(error) => {
                tracing::error!(%error, "bundle serialization failed");
                return String::new();
            }
        };
        let prompt = format!("Question: {utterance}\n\nContext bundle:\n{bundle_json}");
        let request = PlannerRequest::new(prompt).with_system(REPLY_SYSTEM);

        match tokio::time::timeout(self.config.model_timeout, self.planner.complete(&request))
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(PlannerError::Timeout)) | Err(_) => {
                tracing::warn!("reply call timed out");
                String::new()
            }
            Ok(Err(error)) => {
                tracing::warn!(%error, "reply call failed");
                String::new()
            }
        }
    }

    // =========================================================================
    // Command Dispatch
    // =========================================================================

    /// Execute one tool command, returning the uniform response object.
    pub async fn execute_command(&self, command: Command) -> CommandResponse {
        let action = command.action();
        match command {
            Command::StoreMemory {
                content,
                tier,
                category,
                subcategory,
                tags,
                metadata,
                confidence,
            } => {
                let tier = match tier.map(Tier::from_index).transpose() {
                    Ok(tier) => tier.unwrap_or(Tier::Working),
                    Err(error) => return CommandResponse::error(action, error.to_string()),
                };
                let confidence = match confidence.map(validate_confidence).transpose() {
                    Ok(confidence) => confidence,
                    Err(error) => return CommandResponse::error(action, error.to_string()),
                };

                let mut request = CreateRecord::new(content, tier);
                if let Some(category) = category {
                    request = request.with_category(category);
                }
                if let Some(subcategory) = subcategory {
                    request = request.with_subcategory(subcategory);
                }
                if let Some(tags) = tags {
                    request = request.with_tags(tags);
                }
                if let Some(confidence) = confidence {
                    request = request.with_confidence(confidence);
                }
                if let Some(metadata) = metadata {
                    request.extra = metadata;
                }

                match self.store.create(request) {
                    Ok(id) => CommandResponse::ok(
                        action,
                        json!({"record_id": id.as_str(), "tier": id.created_tier().index()}),
                    ),
                    Err(error) => CommandResponse::error(action, error.to_string()),
                }
            }

            Command::RetrieveMemory {
                query,
                tier,
                category,
                limit,
            } => {
                let mut options = SearchOptions::new();
                match tier.map(Tier::from_index).transpose() {
                    Ok(Some(tier)) => options = options.with_tier(tier),
                    Ok(None) => {}
                    Err(error) => return CommandResponse::error(action, error.to_string()),
                }
                if let Some(category) = category {
                    options = options.with_category(category);
                }
                options.limit = limit;

                match self.retrieval.search(&query, &options) {
                    Ok(results) => {
                        let rendered: Vec<serde_json::Value> = results
                            .iter()
                            .map(|r| {
                                json!({
                                    "record_id": r.record.meta.id.as_str(),
                                    "match_type": r.match_type.as_str(),
                                    "match_score": r.score,
                                    "tier": r.record.meta.tier.index(),
                                    "confidence": r.record.meta.confidence,
                                    "summary": r.record.meta.preview,
                                })
                            })
                            .collect();
                        CommandResponse::ok(
                            action,
                            json!({"count": rendered.len(), "results": rendered}),
                        )
                    }
                    Err(error) => CommandResponse::error(action, error.to_string()),
                }
            }

            Command::CreateAssociation {
                source_id,
                target_id,
                relation,
                weight,
            } => {
                let parsed = RecordId::parse(&source_id)
                    .and_then(|s| RecordId::parse(&target_id).map(|t| (s, t)));
                match parsed {
                    Ok((source, target)) => {
                        let relation = relation.unwrap_or_else(|| "related".to_string());
                        let weight =
                            weight.unwrap_or(crate::constants::ASSOCIATION_WEIGHT_DEFAULT);
                        match self.store.create_association(&source, &target, relation, weight)
                        {
                            Ok(()) => CommandResponse::ok(
                                action,
                                json!({"source": source.as_str(), "target": target.as_str()}),
                            ),
                            Err(error) => CommandResponse::error(action, error.to_string()),
                        }
                    }
                    Err(error) => CommandResponse::error(action, error.to_string()),
                }
            }

            Command::GetStatus => {
                let status = self.store.status();
                let counters = self.store.counters();
                match serde_json::to_value(&status) {
                    Ok(mut data) => {
                        data["nodes"] = json!(self.graph.node_count());
                        data["top_level_concepts"] = json!(self.graph.root_doc().top_level);
                        data["session_count"] = json!(counters.session_count);
                        data["nav_fail_counter"] = json!(counters.nav_fail_counter);
                        data["last_rating"] = json!(counters.last_rating);
                        CommandResponse::ok(action, data)
                    }
                    Err(error) => CommandResponse::error(action, error.to_string()),
                }
            }

            Command::Cleanup => match self.store.cleanup_working(
                chrono::Duration::from_std(self.config.working_max_age)
                    .unwrap_or_else(|_| chrono::Duration::hours(24)),
            ) {
                Ok(report) => CommandResponse::ok(
                    action,
                    json!({
                        "deleted": report.deleted,
                        "skipped": report.skipped.len(),
                    }),
                ),
                Err(error) => CommandResponse::error(action, error.to_string()),
            },

            Command::Backup => {
                match backup::create_backup(
                    self.store.root(),
                    &self.clock,
                    self.config.backup_keep_max,
                ) {
                    Ok(path) => {
                        let now = self.clock.now();
                        let _ = self.store.with_navigation(|nav| nav.last_backup = Some(now));
                        CommandResponse::ok(action, json!({"path": path.display().to_string()}))
                    }
                    Err(error) => CommandResponse::error(action, error.to_string()),
                }
            }
        }
    }

    // =========================================================================
    // Joint Link Operations
    // =========================================================================

    /// Attach a record to a concept node (idempotent on the pair).
    ///
    /// # Errors
    /// `NotFound` when either end is missing; storage errors otherwise.
    pub fn attach_record(
        &self,
        node_id: &NodeId,
        record_id: &RecordId,
        summary: Option<&str>,
    ) -> Result<bool, CoordinatorError> {
        Ok(links::attach_record(
            &self.graph,
            &self.store,
            node_id,
            record_id,
            summary,
        )?)
    }

    /// Detach a record from a concept node (idempotent).
    ///
    /// # Errors
    /// `NotFound` when the node is missing; storage errors otherwise.
    pub fn detach_record(
        &self,
        node_id: &NodeId,
        record_id: &RecordId,
    ) -> Result<bool, CoordinatorError> {
        Ok(links::detach_record(
            &self.graph,
            &self.store,
            node_id,
            record_id,
        )?)
    }

    /// Delete a record together with every node link pointing at it.
    ///
    /// # Errors
    /// `NotFound` when the record is missing; storage errors otherwise.
    pub fn delete_record(&self, record_id: &RecordId) -> Result<(), CoordinatorError> {
        Ok(links::delete_record(&self.graph, &self.store, record_id)?)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Evaluate the trigger rules and run at most one maintenance task.
    /// Returns `None` when nothing is due or a run is already in flight.
    ///
    /// # Errors
    /// Backing-store failures from the pipeline.
    pub async fn run_maintenance_if_due(
        &self,
    ) -> Result<Option<MaintenanceReport>, CoordinatorError> {
        let Ok(_guard) = self.maintenance_lock.try_lock() else {
            return Ok(None);
        };

        // An integrity failure earlier scheduled a consistency sweep.
        if self.store.take_sweep_request() {
            let mut issues = self.store.verify_consistency();
            issues.extend(self.graph.verify_consistency());
            issues.extend(links::verify_links(&self.graph, &self.store));
            for issue in &issues {
                tracing::error!(issue, "consistency sweep finding");
            }
        }

        let counters = self.store.counters();
        let now_ms = self.clock.now_ms();
        let idle_secs = now_ms.saturating_sub(counters.last_activity_ms) / 1000;
        let state = TriggerState {
            idle_secs,
            working_backlog: self
                .store
                .list(&RecordFilter::new().with_tier(Tier::Working))
                .len(),
            nav_failures: counters.nav_fail_counter,
            last_rating: counters.last_rating,
        };

        let task = {
            let mut rng = self.rng.lock().unwrap();
            pick_task(&state, &self.config, &mut rng)
        };
        let Some(task) = task else {
            return Ok(None);
        };

        let report = self.maintenance.run(task).await?;
        Ok(Some(report))
    }

    /// Run a specific maintenance task now (bypassing the trigger rules).
    ///
    /// # Errors
    /// Backing-store failures from the pipeline.
    pub async fn run_maintenance(
        &self,
        task: MaintenanceTask,
    ) -> Result<MaintenanceReport, CoordinatorError> {
        let _guard = self.maintenance_lock.lock().await;
        Ok(self.maintenance.run(task).await?)
    }

    /// Handle for cancelling an in-flight maintenance run at the next stage
    /// boundary.
    #[must_use]
    pub fn maintenance_cancel_handle(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.maintenance.cancel_handle()
    }

    // =========================================================================
    // Shutdown and Rating
    // =========================================================================

    /// Drain the active cycle and persist counters and snapshot state.
    ///
    /// # Errors
    /// A persistence failure here is fatal: the caller should exit nonzero.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        let _guard = self.cycle_lock.lock().await;
        let _maintenance_guard = self.maintenance_lock.lock().await;
        self.store.flush()
    }

    /// The seven-dimensional self-rating. The numeric value is consumed only
    /// by the maintenance trigger rule.
    #[must_use]
    pub fn self_rating(&self) -> f64 {
        let status = self.store.status();
        let counters = self.store.counters();
        let backlog = *status.records_by_tier.get(&3).unwrap_or(&0);

        let dimensions = [
            (status.total_records * 2).min(100) as f64,
            (self.graph.node_count() * 5).min(100) as f64,
            (status.association_count * 10).min(100) as f64,
            100.0 - f64::from(counters.nav_fail_counter.min(5) * 20),
            100.0 - (backlog * 10).min(100) as f64,
            counters.session_count.min(100) as f64,
            (status.hot_topics.len() * 20).min(100) as f64,
        ];

        dimensions
            .iter()
            .zip(COORDINATOR_RATING_WEIGHTS.iter())
            .map(|(dim, weight)| dim * weight)
            .sum()
    }

    fn touch_activity(&self) {
        let now_ms = self.clock.now_ms();
        self.update_counters_best_effort(|c| c.last_activity_ms = now_ms);
    }

    /// Counter persistence failures mid-flight are logged, not fatal; only
    /// the shutdown flush may fail the process.
    fn update_counters_best_effort(
        &self,
        f: impl FnOnce(&mut crate::store::snapshot::CounterState),
    ) {
        if let Err(error) = self.store.update_counters(f) {
            tracing::warn!(%error, "counter update not persisted");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ScriptedPlanner;
    use chrono::{TimeZone, Utc};
    use mnema_core::sim::SimClock;

    fn sim_clock() -> Clock {
        Clock::Sim(SimClock::at_datetime(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn open(
        dir: &tempfile::TempDir,
        planner: ScriptedPlanner,
    ) -> Coordinator<ScriptedPlanner> {
        Coordinator::open(
            dir.path(),
            planner,
            SubstrateConfig::default(),
            sim_clock(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_run_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = open(&dir, ScriptedPlanner::new());

        for name in ["meta_cognitive", "integrated", "classified", "working", "graph"] {
            assert!(dir.path().join(name).is_dir(), "{name} missing");
        }
        assert!(dir.path().join("graph/root.json").exists());
        assert!(coordinator.graph().root_doc().top_level.is_empty());

        let response = coordinator
            .execute_command(Command::RetrieveMemory {
                query: "anything".to_string(),
                tier: None,
                category: None,
                limit: None,
            })
            .await;
        assert!(response.is_ok());
        assert_eq!(response.data.unwrap()["count"], 0);
    }

    #[tokio::test]
    async fn test_store_then_retrieve_commands() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = open(&dir, ScriptedPlanner::new());

        let store_response = coordinator
            .execute_command(Command::StoreMemory {
                content: "The substrate guarantees at-most-one concurrent write per record id."
                    .to_string(),
                tier: Some(2),
                category: None,
                subcategory: None,
                tags: Some(vec!["concurrency".to_string(), "invariant".to_string()]),
                metadata: None,
                confidence: None,
            })
            .await;
        assert!(store_response.is_ok());
        let record_id = store_response.data.unwrap()["record_id"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(record_id.starts_with("M2_"));

        let retrieve_response = coordinator
            .execute_command(Command::RetrieveMemory {
                query: "concurrency".to_string(),
                tier: None,
                category: None,
                limit: None,
            })
            .await;
        let data = retrieve_response.data.unwrap();
        assert_eq!(data["results"][0]["record_id"], record_id.as_str());
        assert_eq!(data["results"][0]["match_type"], "exact");
        assert!((data["results"][0]["match_score"].as_f64().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_tier_and_confidence_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = open(&dir, ScriptedPlanner::new());

        let response = coordinator
            .execute_command(Command::StoreMemory {
                content: "x".to_string(),
                tier: Some(7),
                category: None,
                subcategory: None,
                tags: None,
                metadata: None,
                confidence: None,
            })
            .await;
        assert!(!response.is_ok());
        assert!(response.message.unwrap().contains("invalid tier"));

        let response = coordinator
            .execute_command(Command::StoreMemory {
                content: "x".to_string(),
                tier: None,
                category: None,
                subcategory: None,
                tags: None,
                metadata: None,
                confidence: Some(150),
            })
            .await;
        assert!(!response.is_ok());
        assert!(response.message.unwrap().contains("confidence"));
    }

    #[tokio::test]
    async fn test_cycle_executes_commands_and_appends_exchange() {
        let dir = tempfile::tempdir().unwrap();
        // Sandbox consumes nothing (empty graph); the reply issues a command
        // plus free text.
        let planner = ScriptedPlanner::with_responses([
            "", // S1
            "", // S2
            "{\"action\": \"store_memory\", \"params\": {\"content\": \"noted fact\", \"tier\": 2}}\nStored that for you.",
        ]);
        let coordinator = open(&dir, planner);

        let outcome = coordinator.run_cycle("please remember this").await.unwrap();

        assert_eq!(outcome.state, SandboxState::Done);
        assert_eq!(outcome.reply, "Stored that for you.");
        assert_eq!(outcome.command_responses.len(), 1);
        assert!(outcome.command_responses[0].is_ok());

        // The stored fact plus the exchange record itself.
        let counters = coordinator.store().counters();
        assert_eq!(counters.session_count, 1);
        let exchanges = coordinator
            .store()
            .list(&RecordFilter::new().with_category("exchange"));
        assert_eq!(exchanges.len(), 1);
        assert!(exchanges[0].preview.contains("please remember this"));
    }

    #[tokio::test]
    async fn test_cycle_reply_with_no_commands() {
        let dir = tempfile::tempdir().unwrap();
        let planner =
            ScriptedPlanner::with_responses(["", "", "Nothing stored; just an answer."]);
        let coordinator = open(&dir, planner);

        let outcome = coordinator.run_cycle("what do you know").await.unwrap();
        assert!(outcome.command_responses.is_empty());
        assert_eq!(outcome.reply, "Nothing stored; just an answer.");
    }

    #[tokio::test]
    async fn test_backlog_triggers_integration() {
        let dir = tempfile::tempdir().unwrap();
        // Maintenance chain responses for integrate_working.
        let planner = ScriptedPlanner::with_responses([
            "question: should the backlog be integrated?",
            r#"{"resources": [], "issues": ["backlog"], "root_cause": "pile-up",
                "candidate_fixes": ["promote"]}"#,
            "verdict: pass",
            r#"{"records": [{"content": "integrated summary of the backlog", "tier": 2,
                "confidence": 75}]}"#,
        ]);
        let coordinator = open(&dir, planner);

        for i in 0..12 {
            coordinator
                .store()
                .create(CreateRecord::new(format!("note {i}"), Tier::Working))
                .unwrap();
        }

        let report = coordinator.run_maintenance_if_due().await.unwrap().unwrap();
        assert_eq!(report.task, MaintenanceTask::IntegrateWorking);
        assert!(report.committed);
        assert_eq!(report.records_created.len(), 1);

        let classified = coordinator
            .store()
            .list(&RecordFilter::new().with_tier(Tier::Classified));
        assert_eq!(classified.len(), 1);
        assert!(classified[0].rel_path.starts_with("classified/"));
        // The root listing is untouched by a record-only plan.
        assert!(coordinator.graph().root_doc().top_level.is_empty());
    }

    #[tokio::test]
    async fn test_no_maintenance_when_nothing_due() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = open(&dir, ScriptedPlanner::new());
        assert!(coordinator.run_maintenance_if_due().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idle_triggers_some_task() {
        let dir = tempfile::tempdir().unwrap();
        let sim = SimClock::at_datetime(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let coordinator = Coordinator::open(
            dir.path(),
            ScriptedPlanner::new(),
            SubstrateConfig::default(),
            Clock::Sim(sim.clone()),
        )
        .unwrap();

        sim.advance_secs(200);

        // Empty planner script: stage 1 raises no questions, the run ends
        // quietly, but a task was picked.
        let report = coordinator.run_maintenance_if_due().await.unwrap();
        assert!(report.is_some());
        assert!(!report.unwrap().committed);
    }

    #[tokio::test]
    async fn test_joint_attach_detach_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = open(&dir, ScriptedPlanner::new());

        let node = coordinator.graph().create_node(None, "concept", 80).unwrap();
        let record = coordinator
            .store()
            .create(CreateRecord::new("linked fact", Tier::Classified))
            .unwrap();

        assert!(coordinator.attach_record(&node, &record, None).unwrap());
        assert!(!coordinator.attach_record(&node, &record, None).unwrap());
        assert!(coordinator.detach_record(&node, &record).unwrap());
        assert!(coordinator
            .graph()
            .read_node(&node)
            .unwrap()
            .memory_summaries
            .is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = open(&dir, ScriptedPlanner::new());
        coordinator
            .store()
            .update_counters(|c| c.session_count = 9)
            .unwrap();
        coordinator.shutdown().await.unwrap();

        let reopened = open(&dir, ScriptedPlanner::new());
        assert_eq!(reopened.store().counters().session_count, 9);
    }

    #[tokio::test]
    async fn test_self_rating_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = open(&dir, ScriptedPlanner::new());
        let rating = coordinator.self_rating();
        assert!((0.0..=100.0).contains(&rating));
    }
}
