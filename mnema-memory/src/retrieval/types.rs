//! Retrieval Types

use serde::Serialize;

use crate::constants::{
    RETRIEVAL_RESULTS_COUNT_MAX, RETRIEVAL_SCORE_CONTENT, RETRIEVAL_SCORE_EXACT,
    RETRIEVAL_SCORE_FUZZY, RETRIEVAL_SCORE_TAG,
};
use crate::store::record::{Record, Tier};

/// How a record matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Query equals an index key
    Exact,
    /// Query is a substring of an index key or vice versa
    Fuzzy,
    /// Case-insensitive substring of the content
    Content,
    /// A tag contains the query
    Tag,
}

impl MatchType {
    /// The fixed score of this match type.
    #[must_use]
    pub fn score(&self) -> f64 {
        match self {
            Self::Exact => RETRIEVAL_SCORE_EXACT,
            Self::Fuzzy => RETRIEVAL_SCORE_FUZZY,
            Self::Content => RETRIEVAL_SCORE_CONTENT,
            Self::Tag => RETRIEVAL_SCORE_TAG,
        }
    }

    /// Name used in command responses.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::Content => "content",
            Self::Tag => "tag",
        }
    }
}

/// A ranked retrieval result.
#[derive(Debug, Clone)]
pub struct RetrievedRecord {
    /// The full record
    pub record: Record,
    /// How it matched
    pub match_type: MatchType,
    /// The match score
    pub score: f64,
}

/// Options for a retrieval query.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict to a tier
    pub tier: Option<Tier>,
    /// Restrict to a category
    pub category: Option<String>,
    /// Result limit; the engine default applies when absent
    pub limit: Option<usize>,
}

impl SearchOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Restrict to a category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the result limit.
    ///
    /// # Panics
    /// Panics if `limit` is zero or exceeds the maximum.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        debug_assert!(
            limit > 0 && limit <= RETRIEVAL_RESULTS_COUNT_MAX,
            "limit must be 1-{RETRIEVAL_RESULTS_COUNT_MAX}: got {limit}"
        );
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_match_constants() {
        assert!((MatchType::Exact.score() - 1.0).abs() < f64::EPSILON);
        assert!((MatchType::Fuzzy.score() - 0.7).abs() < f64::EPSILON);
        assert!((MatchType::Content.score() - 0.5).abs() < f64::EPSILON);
        assert!((MatchType::Tag.score() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_options_builder() {
        let options = SearchOptions::new().with_tier(Tier::Classified).with_limit(5);
        assert_eq!(options.tier, Some(Tier::Classified));
        assert_eq!(options.limit, Some(5));
        assert!(options.category.is_none());
    }
}
