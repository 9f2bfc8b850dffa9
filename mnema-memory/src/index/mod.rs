//! Inverted Index
//!
//! Derived, in-memory maps from keyword/tier/category to record ids. Never
//! authoritative: rebuilt from the record store's metadata on startup, and
//! every entry must correspond to a live record (round-trip consistency is
//! checked by the consistency sweep).

pub mod tokenize;

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::store::record::{RecordMeta, Tier};

/// Result of a keyword lookup: exact and fuzzy buckets.
#[derive(Debug, Clone, Default)]
pub struct LookupResult {
    /// Ids whose key equals the query
    pub exact: Vec<String>,
    /// Ids whose key contains the query or vice versa
    pub fuzzy: Vec<String>,
}

impl LookupResult {
    /// Whether neither bucket matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.fuzzy.is_empty()
    }
}

#[derive(Debug, Default)]
struct IndexInner {
    keywords: HashMap<String, BTreeSet<String>>,
    tiers: HashMap<Tier, BTreeSet<String>>,
    categories: HashMap<String, BTreeSet<String>>,
}

impl IndexInner {
    fn keys_for(meta: &RecordMeta) -> BTreeSet<String> {
        meta.tags
            .iter()
            .cloned()
            .chain(meta.keywords.iter().cloned())
            .collect()
    }

    fn insert(&mut self, meta: &RecordMeta) {
        let id = meta.id.as_str().to_string();
        for key in Self::keys_for(meta) {
            self.keywords.entry(key).or_default().insert(id.clone());
        }
        self.tiers.entry(meta.tier).or_default().insert(id.clone());
        if let Some(category) = &meta.category {
            self.categories
                .entry(category.clone())
                .or_default()
                .insert(id);
        }
    }

    fn remove(&mut self, id: &str) {
        self.keywords.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
        self.tiers.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
        self.categories.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }
}

/// In-memory inverted index over record metadata.
///
/// `index`/`unindex` are idempotent: re-indexing a record first removes its
/// previous entries, so stale keys never linger after a metadata update.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    inner: RwLock<IndexInner>,
}

impl InvertedIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a record's tags, keywords, tier, and category.
    pub fn index(&self, meta: &RecordMeta) {
        let mut inner = self.inner.write().unwrap();
        inner.remove(meta.id.as_str());
        inner.insert(meta);
    }

    /// Remove a record from all maps.
    pub fn unindex(&self, id: &str) {
        self.inner.write().unwrap().remove(id);
    }

    /// Rebuild from scratch.
    pub fn rebuild<'a>(&self, metas: impl IntoIterator<Item = &'a RecordMeta>) {
        let mut inner = self.inner.write().unwrap();
        *inner = IndexInner::default();
        for meta in metas {
            inner.insert(meta);
        }
    }

    /// Look up a query in the keyword map.
    #[must_use]
    pub fn lookup(&self, query: &str) -> LookupResult {
        let inner = self.inner.read().unwrap();
        let mut result = LookupResult::default();

        if let Some(ids) = inner.keywords.get(query) {
            result.exact = ids.iter().cloned().collect();
        }

        let mut fuzzy: BTreeSet<String> = BTreeSet::new();
        for (key, ids) in &inner.keywords {
            if key == query {
                continue;
            }
            if key.contains(query) || query.contains(key.as_str()) {
                fuzzy.extend(ids.iter().cloned());
            }
        }
        // A record already exact-matched must not reappear as fuzzy.
        for id in &result.exact {
            fuzzy.remove(id);
        }
        result.fuzzy = fuzzy.into_iter().collect();

        result
    }

    /// Ids in a tier.
    #[must_use]
    pub fn by_tier(&self, tier: Tier) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .tiers
            .get(&tier)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids in a category.
    #[must_use]
    pub fn by_category(&self, category: &str) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .categories
            .get(category)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All keys currently in the keyword map.
    #[must_use]
    pub fn known_keywords(&self) -> BTreeSet<String> {
        self.inner.read().unwrap().keywords.keys().cloned().collect()
    }

    /// Ids present anywhere in the index (for consistency checks).
    #[must_use]
    pub fn indexed_ids(&self) -> BTreeSet<String> {
        let inner = self.inner.read().unwrap();
        inner
            .tiers
            .values()
            .flat_map(|ids| ids.iter().cloned())
            .collect()
    }

    /// Snapshot of the keyword map, key → ids (for idempotence checks).
    #[must_use]
    pub fn keyword_map(&self) -> HashMap<String, BTreeSet<String>> {
        self.inner.read().unwrap().keywords.clone()
    }
}
