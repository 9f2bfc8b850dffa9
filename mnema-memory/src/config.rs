//! Substrate Configuration
//!
//! Sensible defaults, builder pattern, explicit over implicit. Every knob
//! also exists as a named constant in [`crate::constants`].

use std::time::Duration;

use crate::constants::{
    BACKUP_KEEP_COUNT_MAX, CONFIDENCE_DELETE_THRESHOLD_DEFAULT,
    CONFIDENCE_DISPLAY_THRESHOLD_DEFAULT, CONFIDENCE_MAX, CONFIDENCE_NEW_DEFAULT,
    COORDINATOR_RATING_CYCLE_INTERVAL, MAINTENANCE_BACKLOG_COUNT_THRESHOLD,
    MAINTENANCE_IDLE_TRIGGER_SECS_DEFAULT, MAINTENANCE_NAVFAIL_COUNT_THRESHOLD,
    PLANNER_TIMEOUT_SECS_DEFAULT, RETRIEVAL_RESULTS_COUNT_DEFAULT, RETRIEVAL_RESULTS_COUNT_MAX,
    SANDBOX_BUDGET_SECS_DEFAULT, SANDBOX_NODES_PER_REQUEST_COUNT_MAX,
    SANDBOX_RECORDS_PER_REQUEST_COUNT_MAX, SANDBOX_ROUNDS_PER_STAGE_COUNT_MAX,
    WORKING_MAX_AGE_SECS_DEFAULT,
};

/// Global configuration for the memory substrate.
///
/// All fields public for transparency; builder methods validate ranges.
///
/// # Example
///
/// ```rust
/// use mnema_memory::config::SubstrateConfig;
/// use std::time::Duration;
///
/// let config = SubstrateConfig::default()
///     .with_max_rounds_per_stage(3)
///     .with_working_max_age(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct SubstrateConfig {
    /// Maximum planner rounds per sandbox stage.
    pub max_rounds_per_stage: usize,

    /// Maximum nodes collected per sandbox request.
    pub max_nodes_per_request: usize,

    /// Maximum records collected per sandbox request.
    pub max_records_per_request: usize,

    /// Age beyond which an unaccessed working record is expired.
    pub working_max_age: Duration,

    /// Idle time that triggers an opportunistic maintenance run.
    pub idle_trigger: Duration,

    /// Working-memory backlog that forces an integration run.
    pub backlog_threshold: usize,

    /// Navigation failures that force a bias audit.
    pub navfail_threshold: u32,

    /// Records below this confidence are hidden from bundles.
    pub confidence_display_threshold: u8,

    /// Records below this confidence are deletion candidates.
    pub confidence_delete_threshold: u8,

    /// Confidence assigned to new records when the caller gives none.
    pub confidence_default_new: u8,

    /// Per-call planner timeout.
    pub model_timeout: Duration,

    /// Total wall-clock budget for one sandbox cycle.
    pub sandbox_budget: Duration,

    /// Default retrieval result limit.
    pub retrieval_limit: usize,

    /// Backups kept on disk.
    pub backup_keep_max: usize,

    /// Cycles between self-rating evaluations.
    pub rating_cycle_interval: u64,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            max_rounds_per_stage: SANDBOX_ROUNDS_PER_STAGE_COUNT_MAX,
            max_nodes_per_request: SANDBOX_NODES_PER_REQUEST_COUNT_MAX,
            max_records_per_request: SANDBOX_RECORDS_PER_REQUEST_COUNT_MAX,
            working_max_age: Duration::from_secs(WORKING_MAX_AGE_SECS_DEFAULT),
            idle_trigger: Duration::from_secs(MAINTENANCE_IDLE_TRIGGER_SECS_DEFAULT),
            backlog_threshold: MAINTENANCE_BACKLOG_COUNT_THRESHOLD,
            navfail_threshold: MAINTENANCE_NAVFAIL_COUNT_THRESHOLD,
            confidence_display_threshold: CONFIDENCE_DISPLAY_THRESHOLD_DEFAULT,
            confidence_delete_threshold: CONFIDENCE_DELETE_THRESHOLD_DEFAULT,
            confidence_default_new: CONFIDENCE_NEW_DEFAULT,
            model_timeout: Duration::from_secs(PLANNER_TIMEOUT_SECS_DEFAULT),
            sandbox_budget: Duration::from_secs(SANDBOX_BUDGET_SECS_DEFAULT),
            retrieval_limit: RETRIEVAL_RESULTS_COUNT_DEFAULT,
            backup_keep_max: BACKUP_KEEP_COUNT_MAX,
            rating_cycle_interval: COORDINATOR_RATING_CYCLE_INTERVAL,
        }
    }
}

impl SubstrateConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-stage round cap.
    ///
    /// # Panics
    /// Panics if `rounds` is zero.
    #[must_use]
    pub fn with_max_rounds_per_stage(mut self, rounds: usize) -> Self {
        debug_assert!(rounds > 0, "rounds must be positive: got {rounds}");
        self.max_rounds_per_stage = rounds;
        self
    }

    /// Set the node collection cap.
    #[must_use]
    pub fn with_max_nodes_per_request(mut self, nodes: usize) -> Self {
        debug_assert!(nodes > 0, "nodes must be positive: got {nodes}");
        self.max_nodes_per_request = nodes;
        self
    }

    /// Set the record collection cap.
    #[must_use]
    pub fn with_max_records_per_request(mut self, records: usize) -> Self {
        debug_assert!(records > 0, "records must be positive: got {records}");
        self.max_records_per_request = records;
        self
    }

    /// Set the working-memory expiry horizon.
    #[must_use]
    pub fn with_working_max_age(mut self, age: Duration) -> Self {
        self.working_max_age = age;
        self
    }

    /// Set the idle maintenance trigger.
    #[must_use]
    pub fn with_idle_trigger(mut self, idle: Duration) -> Self {
        self.idle_trigger = idle;
        self
    }

    /// Set the working-backlog threshold.
    #[must_use]
    pub fn with_backlog_threshold(mut self, threshold: usize) -> Self {
        debug_assert!(threshold > 0, "threshold must be positive: got {threshold}");
        self.backlog_threshold = threshold;
        self
    }

    /// Set the navigation-failure threshold.
    #[must_use]
    pub fn with_navfail_threshold(mut self, threshold: u32) -> Self {
        debug_assert!(threshold > 0, "threshold must be positive: got {threshold}");
        self.navfail_threshold = threshold;
        self
    }

    /// Set the default confidence for new records.
    ///
    /// # Panics
    /// Panics if `confidence` exceeds the scale maximum.
    #[must_use]
    pub fn with_confidence_default_new(mut self, confidence: u8) -> Self {
        debug_assert!(
            confidence <= CONFIDENCE_MAX,
            "confidence must be 0-{CONFIDENCE_MAX}: got {confidence}"
        );
        self.confidence_default_new = confidence;
        self
    }

    /// Set the per-call planner timeout.
    #[must_use]
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Set the total sandbox budget.
    #[must_use]
    pub fn with_sandbox_budget(mut self, budget: Duration) -> Self {
        self.sandbox_budget = budget;
        self
    }

    /// Set the default retrieval limit.
    ///
    /// # Panics
    /// Panics if `limit` is zero or exceeds the maximum.
    #[must_use]
    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        debug_assert!(
            limit > 0 && limit <= RETRIEVAL_RESULTS_COUNT_MAX,
            "limit must be 1-{RETRIEVAL_RESULTS_COUNT_MAX}: got {limit}"
        );
        self.retrieval_limit = limit;
        self
    }

    /// Set how many backups are kept on disk.
    #[must_use]
    pub fn with_backup_keep_max(mut self, keep: usize) -> Self {
        debug_assert!(keep > 0, "keep must be positive: got {keep}");
        self.backup_keep_max = keep;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SubstrateConfig::default();

        assert_eq!(config.max_rounds_per_stage, 5);
        assert_eq!(config.max_nodes_per_request, 200);
        assert_eq!(config.max_records_per_request, 100);
        assert_eq!(config.working_max_age, Duration::from_secs(86_400));
        assert_eq!(config.idle_trigger, Duration::from_secs(180));
        assert_eq!(config.backlog_threshold, 10);
        assert_eq!(config.navfail_threshold, 3);
        assert_eq!(config.model_timeout, Duration::from_secs(30));
        assert_eq!(config.sandbox_budget, Duration::from_secs(60));
        assert_eq!(config.confidence_default_new, 70);
    }

    #[test]
    fn test_builder_chaining() {
        let config = SubstrateConfig::new()
            .with_max_rounds_per_stage(3)
            .with_backlog_threshold(5)
            .with_working_max_age(Duration::from_secs(60))
            .with_retrieval_limit(20);

        assert_eq!(config.max_rounds_per_stage, 3);
        assert_eq!(config.backlog_threshold, 5);
        assert_eq!(config.working_max_age, Duration::from_secs(60));
        assert_eq!(config.retrieval_limit, 20);
    }

    #[test]
    #[should_panic(expected = "limit must be")]
    fn test_invalid_retrieval_limit() {
        let _ = SubstrateConfig::new().with_retrieval_limit(0);
    }
}
