//! Retrieval Engine
//!
//! Resolves a query to a ranked record list through ordered passes: exact
//! keyword, fuzzy keyword, then a full content/tag scan. Each later pass runs
//! only until the limit is reached. Ranking is `(score, tier priority)`
//! descending with access-time tie-breaks. An empty result is not an error.

pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::constants::{RETRIEVAL_ACCESS_STAMP_COUNT, RETRIEVAL_RESULTS_COUNT_DEFAULT};
use crate::store::error::StoreResult;
use crate::store::record::{Record, RecordId, RecordMeta};
use crate::store::{RecordFilter, RecordStore};

pub use self::types::{MatchType, RetrievedRecord, SearchOptions};

/// Ranked retrieval over the record store and its inverted index.
pub struct RetrievalEngine {
    store: Arc<RecordStore>,
    default_limit: usize,
}

impl RetrievalEngine {
    /// Create an engine over a store.
    #[must_use]
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            default_limit: RETRIEVAL_RESULTS_COUNT_DEFAULT,
        }
    }

    /// Override the default result limit.
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        debug_assert!(limit > 0, "limit must be positive");
        self.default_limit = limit;
        self
    }

    /// Run the ordered retrieval passes.
    ///
    /// Side effects: the top results get access stamps, the query joins the
    /// recent-searches ring and the hot-topic counter.
    ///
    /// # Errors
    /// Only underlying store errors; an empty result is `Ok`.
    #[tracing::instrument(skip(self), fields(query_len = query.len()))]
    pub fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> StoreResult<Vec<RetrievedRecord>> {
        let limit = options.limit.unwrap_or(self.default_limit);
        let query_trimmed = query.trim();
        if query_trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut hits: Vec<(RecordMeta, MatchType)> = Vec::new();

        // Pass 1 and 2: the inverted index.
        let lookup = self.store.index().lookup(query_trimmed);
        self.collect_ids(&lookup.exact, MatchType::Exact, options, &mut seen, &mut hits, limit);
        if hits.len() < limit {
            self.collect_ids(&lookup.fuzzy, MatchType::Fuzzy, options, &mut seen, &mut hits, limit);
        }

        // Pass 3: full scan, content substring then tag substring.
        let mut contents: Vec<(String, String)> = Vec::new();
        if hits.len() < limit {
            let query_lower = query_trimmed.to_lowercase();
            let filter = filter_from(options);
            for meta in self.store.list(&filter) {
                if hits.len() >= limit {
                    break;
                }
                if seen.contains(meta.id.as_str()) {
                    continue;
                }
                let Ok(content) = self.store.content_of(&meta) else {
                    tracing::warn!(id = meta.id.as_str(), "unreadable content skipped in scan");
                    continue;
                };
                let match_type = if content.to_lowercase().contains(&query_lower) {
                    MatchType::Content
                } else if meta.tags.iter().any(|tag| tag.contains(query_trimmed)) {
                    MatchType::Tag
                } else {
                    continue;
                };
                seen.insert(meta.id.as_str().to_string());
                contents.push((meta.id.as_str().to_string(), content));
                hits.push((meta, match_type));
            }
        }

        // Rank: score desc, tier priority desc, then recency.
        hits.sort_by(|(a, ta), (b, tb)| {
            tb.score()
                .partial_cmp(&ta.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.tier.priority().cmp(&a.tier.priority()))
                .then_with(|| b.last_accessed_at.cmp(&a.last_accessed_at))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        hits.truncate(limit);

        // Stamp the top results, then report the stamped metadata.
        let stamp_ids: Vec<RecordId> = hits
            .iter()
            .take(RETRIEVAL_ACCESS_STAMP_COUNT)
            .map(|(meta, _)| meta.id.clone())
            .collect();
        self.store.mark_accessed(&stamp_ids)?;

        let mut results = Vec::with_capacity(hits.len());
        for (meta, match_type) in hits {
            let meta = self.store.get_meta(&meta.id).unwrap_or(meta);
            let content = match contents.iter().find(|(id, _)| id == meta.id.as_str()) {
                Some((_, content)) => content.clone(),
                None => match self.store.content_of(&meta) {
                    Ok(content) => content,
                    Err(error) => {
                        tracing::warn!(id = meta.id.as_str(), %error, "content lost between passes");
                        continue;
                    }
                },
            };
            results.push(RetrievedRecord {
                score: match_type.score(),
                match_type,
                record: Record { meta, content },
            });
        }

        self.store.record_search(query_trimmed, results.len());
        Ok(results)
    }

    fn collect_ids(
        &self,
        ids: &[String],
        match_type: MatchType,
        options: &SearchOptions,
        seen: &mut BTreeSet<String>,
        hits: &mut Vec<(RecordMeta, MatchType)>,
        limit: usize,
    ) {
        for raw in ids {
            if hits.len() >= limit {
                return;
            }
            if seen.contains(raw) {
                continue;
            }
            let Ok(id) = RecordId::parse(raw) else {
                continue;
            };
            let Some(meta) = self.store.get_meta(&id) else {
                continue;
            };
            if let Some(tier) = options.tier {
                if meta.tier != tier {
                    continue;
                }
            }
            if let Some(category) = &options.category {
                if meta.category.as_deref() != Some(category.as_str()) {
                    continue;
                }
            }
            seen.insert(raw.clone());
            hits.push((meta, match_type));
        }
    }
}

fn filter_from(options: &SearchOptions) -> RecordFilter {
    let mut filter = RecordFilter::new();
    if let Some(tier) = options.tier {
        filter = filter.with_tier(tier);
    }
    if let Some(category) = &options.category {
        filter = filter.with_category(category.clone());
    }
    filter
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::journal::Journal;
    use crate::store::record::Tier;
    use crate::store::CreateRecord;
    use chrono::{TimeZone, Utc};
    use mnema_core::sim::SimClock;

    fn engine() -> (tempfile::TempDir, RetrievalEngine, Arc<RecordStore>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Clock::Sim(SimClock::at_datetime(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let journal = Arc::new(Journal::open(dir.path(), clock.clone()).unwrap());
        let store = Arc::new(RecordStore::open(dir.path(), clock, journal, 70).unwrap());
        (dir, RetrievalEngine::new(Arc::clone(&store)), store)
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let (_dir, engine, store) = engine();
        let id = store
            .create(
                CreateRecord::new(
                    "The substrate guarantees at-most-one concurrent write per record id.",
                    Tier::Classified,
                )
                .with_tags(["concurrency", "invariant"]),
            )
            .unwrap();
        store
            .create(CreateRecord::new("unrelated note about gardening", Tier::Working))
            .unwrap();

        let results = engine.search("concurrency", &SearchOptions::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.meta.id, id);
        assert_eq!(results[0].match_type, MatchType::Exact);
        assert!((results[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fuzzy_match_scores_lower() {
        let (_dir, engine, store) = engine();
        store
            .create(CreateRecord::new("a", Tier::Classified).with_tags(["concurrency-model"]))
            .unwrap();

        let results = engine.search("concurrency", &SearchOptions::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Fuzzy);
    }

    #[test]
    fn test_content_scan_pass() {
        let (_dir, engine, store) = engine();
        store
            .create(CreateRecord::new("alpha beta gamma", Tier::Working))
            .unwrap();

        // Spans a token boundary, so no index key contains it and it contains
        // no index key: only the content scan can find it.
        let results = engine.search("ha be", &SearchOptions::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Content);
    }

    #[test]
    fn test_tier_priority_breaks_score_ties() {
        let (_dir, engine, store) = engine();
        store
            .create(CreateRecord::new("working entry", Tier::Working).with_tags(["shared"]))
            .unwrap();
        store
            .create(CreateRecord::new("meta entry", Tier::MetaCognitive).with_tags(["shared"]))
            .unwrap();

        let results = engine.search("shared", &SearchOptions::new()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.meta.tier, Tier::MetaCognitive);
        assert_eq!(results[1].record.meta.tier, Tier::Working);
    }

    #[test]
    fn test_limit_respected() {
        let (_dir, engine, store) = engine();
        for i in 0..5 {
            store
                .create(CreateRecord::new(format!("entry {i}"), Tier::Working).with_tags(["many"]))
                .unwrap();
        }

        let results = engine
            .search("many", &SearchOptions::new().with_limit(2))
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_side_effects_stamp_and_record_search() {
        let (_dir, engine, store) = engine();
        let id = store
            .create(CreateRecord::new("stamped", Tier::Working).with_tags(["stamp"]))
            .unwrap();

        let results = engine.search("stamp", &SearchOptions::new()).unwrap();
        assert_eq!(results[0].record.meta.access_count, 1);
        assert!(results[0].record.meta.last_accessed_at.is_some());

        let meta = store.get_meta(&id).unwrap();
        assert_eq!(meta.access_count, 1);

        let nav = store.navigation();
        assert_eq!(nav.recent_searches.len(), 1);
        assert_eq!(nav.recent_searches[0].query, "stamp");
        assert_eq!(nav.hot_topics.get("stamp"), Some(&1));
    }

    #[test]
    fn test_empty_query_and_miss_are_ok() {
        let (_dir, engine, _store) = engine();
        assert!(engine.search("", &SearchOptions::new()).unwrap().is_empty());
        assert!(engine
            .search("nothing here", &SearchOptions::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_tier_filter() {
        let (_dir, engine, store) = engine();
        store
            .create(CreateRecord::new("w", Tier::Working).with_tags(["filterme"]))
            .unwrap();
        store
            .create(CreateRecord::new("c", Tier::Classified).with_tags(["filterme"]))
            .unwrap();

        let results = engine
            .search("filterme", &SearchOptions::new().with_tier(Tier::Classified))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.meta.tier, Tier::Classified);
    }
}
