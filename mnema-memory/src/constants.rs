//! Substrate Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`.
//! Example: `SANDBOX_NODES_PER_REQUEST_COUNT_MAX` (not `MAX_NODES`).
//!
//! Every constant includes units in the name:
//! - `_BYTES_MAX`/`_CHARS_MAX` for size limits
//! - `_SECS_DEFAULT` for time durations
//! - `_COUNT_MAX` for quantity limits

// =============================================================================
// Record Limits
// =============================================================================

/// Maximum size of record content
pub const RECORD_CONTENT_BYTES_MAX: usize = 1_000_000; // 1MB

/// Characters of content cached as a preview in the metadata index
pub const RECORD_PREVIEW_CHARS_MAX: usize = 200;

/// Maximum number of tags per record
pub const RECORD_TAGS_COUNT_MAX: usize = 100;

/// Maximum length of a single tag
pub const RECORD_TAG_BYTES_MAX: usize = 256;

/// Digits in the record id timestamp segment (yyyymmddhhmmssfff)
pub const RECORD_ID_TIMESTAMP_DIGITS_COUNT: usize = 17;

/// Hex chars of the content digest carried in the record id
pub const RECORD_ID_HASH_CHARS_COUNT: usize = 6;

// =============================================================================
// Confidence Scale
// =============================================================================

/// Minimum confidence value
pub const CONFIDENCE_MIN: u8 = 0;

/// Maximum confidence value
pub const CONFIDENCE_MAX: u8 = 100;

/// Confidence at or above which a record is high-value
pub const CONFIDENCE_HIGH_THRESHOLD: u8 = 80;

/// Confidence at or above which a record is medium-value
pub const CONFIDENCE_MEDIUM_THRESHOLD: u8 = 50;

/// Default display cutoff
pub const CONFIDENCE_DISPLAY_THRESHOLD_DEFAULT: u8 = 30;

/// Default deletion cutoff
pub const CONFIDENCE_DELETE_THRESHOLD_DEFAULT: u8 = 10;

/// Default confidence for newly created records
pub const CONFIDENCE_NEW_DEFAULT: u8 = 70;

/// Confidence adjustment applied by maintenance promotions and demotions
pub const CONFIDENCE_PROMOTION_DELTA: u8 = 10;

// =============================================================================
// Tier Priorities (ranking weights)
// =============================================================================

/// Priority weight of tier 0 (meta-cognitive)
pub const TIER_PRIORITY_META: u32 = 100;

/// Priority weight of tier 1 (integrated)
pub const TIER_PRIORITY_INTEGRATED: u32 = 80;

/// Priority weight of tier 2 (classified)
pub const TIER_PRIORITY_CLASSIFIED: u32 = 60;

/// Priority weight of tier 3 (working)
pub const TIER_PRIORITY_WORKING: u32 = 40;

// =============================================================================
// Graph Limits
// =============================================================================

/// Maximum depth of a concept node id (dot-separated segments)
pub const GRAPH_DEPTH_COUNT_MAX: usize = 10;

/// Maximum edge strength on parent/child references
pub const GRAPH_STRENGTH_MAX: u8 = 100;

/// Default edge strength for freshly linked references
pub const GRAPH_STRENGTH_DEFAULT: u8 = 100;

// =============================================================================
// Association Limits
// =============================================================================

/// Minimum association edge weight
pub const ASSOCIATION_WEIGHT_MIN: f64 = 0.0;

/// Maximum association edge weight
pub const ASSOCIATION_WEIGHT_MAX: f64 = 1.0;

/// Default association edge weight
pub const ASSOCIATION_WEIGHT_DEFAULT: f64 = 0.5;

/// Depth cap for association traversal
pub const ASSOCIATION_TRAVERSAL_DEPTH_MAX: usize = 3;

// =============================================================================
// Inverted Index Limits
// =============================================================================

/// Content keywords kept per record (top-K by frequency)
pub const INDEX_KEYWORDS_PER_RECORD_COUNT_MAX: usize = 10;

/// Minimum token length (chars) admitted to the index
pub const INDEX_TOKEN_CHARS_MIN: usize = 2;

// =============================================================================
// Retrieval
// =============================================================================

/// Default number of retrieval results
pub const RETRIEVAL_RESULTS_COUNT_DEFAULT: usize = 10;

/// Maximum number of retrieval results
pub const RETRIEVAL_RESULTS_COUNT_MAX: usize = 50;

/// Length of the recent-searches ring buffer
pub const RETRIEVAL_RECENT_SEARCHES_COUNT_MAX: usize = 20;

/// Number of top results stamped with access metadata
pub const RETRIEVAL_ACCESS_STAMP_COUNT: usize = 5;

/// Score of an exact keyword hit
pub const RETRIEVAL_SCORE_EXACT: f64 = 1.0;

/// Score of a fuzzy keyword hit
pub const RETRIEVAL_SCORE_FUZZY: f64 = 0.7;

/// Score of a content substring hit
pub const RETRIEVAL_SCORE_CONTENT: f64 = 0.5;

/// Score of a tag substring hit
pub const RETRIEVAL_SCORE_TAG: f64 = 0.3;

// =============================================================================
// Sandbox
// =============================================================================

/// Maximum planner rounds per sandbox stage
pub const SANDBOX_ROUNDS_PER_STAGE_COUNT_MAX: usize = 5;

/// Maximum nodes collected per request
pub const SANDBOX_NODES_PER_REQUEST_COUNT_MAX: usize = 200;

/// Maximum records collected per request
pub const SANDBOX_RECORDS_PER_REQUEST_COUNT_MAX: usize = 100;

/// Total wall-clock budget for one sandbox cycle
pub const SANDBOX_BUDGET_SECS_DEFAULT: u64 = 60;

/// Characters of record content quoted in bundle summaries
pub const BUNDLE_SUMMARY_CHARS_MAX: usize = 100;

// =============================================================================
// Planner
// =============================================================================

/// Per-call planner timeout
pub const PLANNER_TIMEOUT_SECS_DEFAULT: u64 = 30;

/// Maximum size of a planner prompt
pub const PLANNER_PROMPT_BYTES_MAX: usize = 100_000;

/// Maximum size of a planner response
pub const PLANNER_RESPONSE_BYTES_MAX: usize = 50_000;

// =============================================================================
// Maintenance
// =============================================================================

/// Idle time that triggers an opportunistic maintenance run
pub const MAINTENANCE_IDLE_TRIGGER_SECS_DEFAULT: u64 = 180;

/// Working-memory backlog that forces an integration run
pub const MAINTENANCE_BACKLOG_COUNT_THRESHOLD: usize = 10;

/// Navigation failures that force a bias audit
pub const MAINTENANCE_NAVFAIL_COUNT_THRESHOLD: u32 = 3;

/// Fail-major retries allowed per maintenance run
pub const MAINTENANCE_RETRY_COUNT_MAX: u32 = 2;

/// Candidate records offered to the question-output stage
pub const MAINTENANCE_CANDIDATES_COUNT_MAX: usize = 10;

// =============================================================================
// Lifecycle
// =============================================================================

/// Age beyond which an unaccessed working record is expired
pub const WORKING_MAX_AGE_SECS_DEFAULT: u64 = 86_400; // 24h

// =============================================================================
// Backup
// =============================================================================

/// Backups kept on disk (oldest pruned first)
pub const BACKUP_KEEP_COUNT_MAX: usize = 10;

// =============================================================================
// Coordinator
// =============================================================================

/// Cycles between self-rating evaluations
pub const COORDINATOR_RATING_CYCLE_INTERVAL: u64 = 10;

/// Self-rating floor below which maintenance prefers strategy rehearsal
pub const COORDINATOR_RATING_LOW_THRESHOLD: f64 = 60.0;

/// Weights of the seven self-rating dimensions (must sum to 1.0)
pub const COORDINATOR_RATING_WEIGHTS: [f64; 7] = [0.20, 0.18, 0.16, 0.14, 0.12, 0.10, 0.10];

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_thresholds_ordered() {
        assert!(CONFIDENCE_DELETE_THRESHOLD_DEFAULT < CONFIDENCE_DISPLAY_THRESHOLD_DEFAULT);
        assert!(CONFIDENCE_MEDIUM_THRESHOLD < CONFIDENCE_HIGH_THRESHOLD);
        assert!(CONFIDENCE_HIGH_THRESHOLD <= CONFIDENCE_MAX);
    }

    #[test]
    fn test_tier_priorities_descend() {
        assert!(TIER_PRIORITY_META > TIER_PRIORITY_INTEGRATED);
        assert!(TIER_PRIORITY_INTEGRATED > TIER_PRIORITY_CLASSIFIED);
        assert!(TIER_PRIORITY_CLASSIFIED > TIER_PRIORITY_WORKING);
    }

    #[test]
    fn test_retrieval_scores_descend() {
        assert!(RETRIEVAL_SCORE_EXACT > RETRIEVAL_SCORE_FUZZY);
        assert!(RETRIEVAL_SCORE_FUZZY > RETRIEVAL_SCORE_CONTENT);
        assert!(RETRIEVAL_SCORE_CONTENT > RETRIEVAL_SCORE_TAG);
    }

    #[test]
    fn test_rating_weights_sum_to_one() {
        let sum: f64 = COORDINATOR_RATING_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sandbox_limits_valid() {
        assert!(SANDBOX_ROUNDS_PER_STAGE_COUNT_MAX >= 1);
        assert!(SANDBOX_RECORDS_PER_REQUEST_COUNT_MAX <= SANDBOX_NODES_PER_REQUEST_COUNT_MAX);
        assert!(PLANNER_TIMEOUT_SECS_DEFAULT < SANDBOX_BUDGET_SECS_DEFAULT * 2);
    }
}
