//! # Mnema Memory
//!
//! A self-organizing memory substrate that sits between a human operator and
//! a language model: it persists past interactions and derived concepts,
//! retrieves structurally relevant fragments on demand, and reorganizes
//! itself during idle time. The model talks to the substrate through a
//! narrow command protocol; the substrate owns all persistence and indexing.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       Coordinator                          │
//! │   cycle sequencing · command dispatch · counters · rating  │
//! ├───────────────────────────────────────────────────────────┤
//! │  Concept Sandbox (S1 locate → S2 pick → S3 assemble)       │
//! │  Maintenance Pipeline (question → analyze → review →       │
//! │                        organize → format-review)           │
//! ├───────────────────────────────────────────────────────────┤
//! │  Retrieval Engine  │ exact / fuzzy / scan, tier-ranked     │
//! │  Inverted Index    │ derived keyword → record-id maps      │
//! ├───────────────────────────────────────────────────────────┤
//! │  Record Store      │ four tiers, content files + snapshot  │
//! │  Concept Graph     │ dotted-path nodes, root listing       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use mnema_memory::clock::Clock;
//! use mnema_memory::config::SubstrateConfig;
//! use mnema_memory::coordinator::{Command, Coordinator};
//! use mnema_memory::planner::ScriptedPlanner;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let dir = tempfile::tempdir().unwrap();
//! let planner = ScriptedPlanner::new();
//! let coordinator = Coordinator::open(
//!     dir.path(),
//!     planner,
//!     SubstrateConfig::default(),
//!     Clock::System,
//! )
//! .unwrap();
//!
//! let response = coordinator
//!     .execute_command(Command::StoreMemory {
//!         content: "records promote through the tiers".to_string(),
//!         tier: Some(2),
//!         category: None,
//!         subcategory: None,
//!         tags: Some(vec!["tiers".to_string()]),
//!         metadata: None,
//!         confidence: None,
//!     })
//!     .await;
//! assert!(response.is_ok());
//! # }
//! ```
//!
//! ## Simulation-First
//!
//! Every planner-driven flow runs deterministically in tests: a
//! [`planner::ScriptedPlanner`] replays canned model outputs, a
//! [`mnema_core::sim::SimClock`] drives every lifecycle rule, and
//! [`mnema_core::sim::FaultInjector`] makes the storage failure paths
//! reachable.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod backup;
pub mod clock;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod graph;
pub mod index;
pub mod journal;
pub mod links;
pub mod maintenance;
pub mod planner;
pub mod retrieval;
pub mod sandbox;
pub mod store;

// Re-export the main surface.
pub use clock::Clock;
pub use config::SubstrateConfig;
pub use coordinator::{
    parse_command, Command, CommandParseError, CommandResponse, Coordinator, CoordinatorError,
    CycleOutcome,
};
pub use graph::{ConceptNode, GraphError, GraphStore, MemorySummary, NodeId, NodePatch, NodeRef};
pub use index::InvertedIndex;
pub use journal::{Journal, JournalEntry, JournalKind};
pub use maintenance::{
    MaintenancePipeline, MaintenanceReport, MaintenanceTask, ReviewVerdict, TriggerState,
};
pub use planner::{PlannerError, PlannerProvider, PlannerRequest, ScriptedPlanner};
pub use retrieval::{MatchType, RetrievalEngine, RetrievedRecord, SearchOptions};
pub use sandbox::{
    ConfidenceLevel, ContextBundle, Intent, Sandbox, SandboxError, SandboxOutcome, SandboxState,
    StageLogEntry,
};
pub use store::error::{StoreError, StoreResult};
pub use store::record::{MetadataPatch, Record, RecordId, RecordMeta, Tier, ValueLevel};
pub use store::{CleanupReport, CreateRecord, RecordFilter, RecordStore, StoreStatus};

// Re-export the harness crate so tests and downstream users pin one version.
pub use mnema_core;
