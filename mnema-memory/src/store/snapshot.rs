//! Snapshot Document
//!
//! `index_snapshot.json` is the single authoritative metadata document:
//! record metadata, association edges, navigation state, and coordinator
//! counters. Written atomically (temp-then-rename). The inverted index is
//! derived from it and has no durable shape of its own.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assoc::AssociationMap;
use super::record::RecordMeta;
use crate::constants::RETRIEVAL_RECENT_SEARCHES_COUNT_MAX;

/// File name of the snapshot document under the substrate root.
pub const SNAPSHOT_FILE_NAME: &str = "index_snapshot.json";

// =============================================================================
// Navigation State
// =============================================================================

/// One remembered search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentSearch {
    /// The query string
    pub query: String,
    /// When it ran
    pub timestamp: DateTime<Utc>,
    /// How many results it returned
    pub results_count: usize,
}

/// Navigation heat persisted across restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationState {
    /// Ring buffer of recent searches, newest first
    pub recent_searches: VecDeque<RecentSearch>,
    /// Query → hit counter
    pub hot_topics: BTreeMap<String, u64>,
    /// Paths that recently failed to resolve during navigation, newest first
    pub recent_nav_failures: VecDeque<String>,
    /// Prompt hints rewritten by strategy rehearsal
    pub strategy_hints: Option<String>,
    /// Last working-memory cleanup
    pub last_cleanup: Option<DateTime<Utc>>,
    /// Last backup
    pub last_backup: Option<DateTime<Utc>>,
}

impl NavigationState {
    /// Record a search in the ring buffer and hot-topic counter.
    pub fn record_search(&mut self, query: &str, results_count: usize, at: DateTime<Utc>) {
        if query.trim().is_empty() {
            return;
        }
        self.recent_searches.push_front(RecentSearch {
            query: query.to_string(),
            timestamp: at,
            results_count,
        });
        self.recent_searches
            .truncate(RETRIEVAL_RECENT_SEARCHES_COUNT_MAX);
        *self.hot_topics.entry(query.to_string()).or_insert(0) += 1;
    }

    /// Record a navigation failure path.
    pub fn record_nav_failure(&mut self, path: &str) {
        self.recent_nav_failures.push_front(path.to_string());
        self.recent_nav_failures
            .truncate(RETRIEVAL_RECENT_SEARCHES_COUNT_MAX);
    }

    /// Hot topics ordered by count descending.
    #[must_use]
    pub fn top_topics(&self, limit: usize) -> Vec<(String, u64)> {
        let mut topics: Vec<(String, u64)> = self
            .hot_topics
            .iter()
            .map(|(q, c)| (q.clone(), *c))
            .collect();
        topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        topics.truncate(limit);
        topics
    }
}

// =============================================================================
// Counter State
// =============================================================================

/// Coordinator counters, persisted so a restart resumes trigger state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterState {
    /// Completed exchanges
    pub session_count: u64,
    /// Navigation failures since the last bias audit
    pub nav_fail_counter: u32,
    /// Last activity, milliseconds since epoch
    pub last_activity_ms: u64,
    /// Cycles since the last self-rating evaluation
    pub cycles_since_rating: u64,
    /// Most recent self-rating, if any
    pub last_rating: Option<f64>,
}

// =============================================================================
// Snapshot
// =============================================================================

/// The authoritative snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Record id → metadata
    pub records: BTreeMap<String, RecordMeta>,
    /// Association edges between records
    #[serde(default)]
    pub associations: AssociationMap,
    /// Navigation heat
    #[serde(default)]
    pub navigation: NavigationState,
    /// Coordinator counters
    #[serde(default)]
    pub counters: CounterState,
    /// Last write stamp
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Load the snapshot from `dir`, if present and parseable.
    ///
    /// A corrupt snapshot is reported and treated as absent; the caller falls
    /// back to rebuilding from file listings.
    #[must_use]
    pub fn load(dir: &Path) -> Option<Self> {
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                tracing::error!(path = %path.display(), %error, "snapshot corrupt, rebuilding from listings");
                None
            }
        }
    }

    /// Write the snapshot atomically into `dir`.
    ///
    /// # Errors
    /// Returns `std::io::Error` on serialization or I/O failure.
    pub fn save_atomic(&self, dir: &Path) -> std::io::Result<()> {
        let path = dir.join(SNAPSHOT_FILE_NAME);
        let tmp = dir.join(format!("{SNAPSHOT_FILE_NAME}.tmp"));

        let payload = serde_json::to_vec_pretty(self)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
    }
}
