//! Record Store
//!
//! Durable, append-biased storage of memory records with a tier-aware path
//! layout. The content file is the only per-record artifact on disk; all
//! metadata lives in the snapshot document. Single-writer, many-reader: a
//! writer holds the inner write lock for the whole mutation, so readers never
//! observe half-applied state.

pub mod assoc;
pub mod error;
pub mod record;
pub mod snapshot;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use mnema_core::sim::FaultInjector;
use serde::Serialize;
use serde_json::json;

use crate::clock::Clock;
use crate::constants::{CONFIDENCE_MAX, RECORD_CONTENT_BYTES_MAX};
use crate::index::{tokenize, InvertedIndex};
use crate::journal::{Journal, JournalKind};

use self::assoc::RelatedRecord;
use self::error::{StoreError, StoreResult};
use self::record::{
    content_preview, validate_tags, MetadataPatch, Record, RecordId, RecordMeta, Tier, ValueLevel,
};
use self::snapshot::{CounterState, NavigationState, Snapshot};

// =============================================================================
// Requests and Reports
// =============================================================================

/// Parameters for creating a record.
#[derive(Debug, Clone)]
pub struct CreateRecord {
    /// Record content (raw UTF-8)
    pub content: String,
    /// Lifecycle tier
    pub tier: Tier,
    /// Category label
    pub category: Option<String>,
    /// Subcategory label
    pub subcategory: Option<String>,
    /// Explicit tags
    pub tags: BTreeSet<String>,
    /// Confidence; the configured default applies when absent
    pub confidence: Option<u8>,
    /// Caller-supplied opaque metadata
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CreateRecord {
    /// Create a request with content and tier.
    #[must_use]
    pub fn new(content: impl Into<String>, tier: Tier) -> Self {
        Self {
            content: content.into(),
            tier,
            category: None,
            subcategory: None,
            tags: BTreeSet::new(),
            confidence: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the subcategory.
    #[must_use]
    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    /// Set the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        debug_assert!(
            confidence <= CONFIDENCE_MAX,
            "confidence must be 0-{CONFIDENCE_MAX}: got {confidence}"
        );
        self.confidence = Some(confidence);
        self
    }
}

/// Filter for listing records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to one tier
    pub tier: Option<Tier>,
    /// Require a tag
    pub tag: Option<String>,
    /// Require a category
    pub category: Option<String>,
    /// Created at or after
    pub since: Option<DateTime<Utc>>,
    /// Created before
    pub until: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Empty filter (everything matches).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Require a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Require a category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restrict to a creation date range.
    #[must_use]
    pub fn with_range(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    fn matches(&self, meta: &RecordMeta) -> bool {
        if let Some(tier) = self.tier {
            if meta.tier != tier {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !meta.tags.contains(tag) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if meta.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if meta.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if meta.created_at >= until {
                return false;
            }
        }
        true
    }
}

/// Outcome of a working-memory cleanup sweep.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Ids deleted by the sweep
    pub deleted: Vec<String>,
    /// Ids left in place, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Store status for `get_status` reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    /// Record counts by tier index
    pub records_by_tier: BTreeMap<u8, usize>,
    /// Total record count
    pub total_records: usize,
    /// Association edge count
    pub association_count: usize,
    /// Most-queried topics
    pub hot_topics: Vec<(String, u64)>,
    /// Last cleanup stamp
    pub last_cleanup: Option<DateTime<Utc>>,
    /// Last backup stamp
    pub last_backup: Option<DateTime<Utc>>,
    /// Whether the store is degraded to read-only
    pub read_only: bool,
}

// =============================================================================
// RecordStore
// =============================================================================

/// Tier-aware record storage over a directory root.
pub struct RecordStore {
    root: PathBuf,
    clock: Clock,
    journal: Arc<Journal>,
    index: InvertedIndex,
    inner: RwLock<Snapshot>,
    faults: Option<Arc<FaultInjector>>,
    read_only: AtomicBool,
    sweep_requested: AtomicBool,
    default_confidence: u8,
}

impl RecordStore {
    /// Open the store under `root`, creating the tier layout on first run.
    ///
    /// Loads the snapshot document if present; a missing or corrupt snapshot
    /// falls back to rebuilding metadata from the content-file listing.
    ///
    /// # Errors
    /// Returns `Storage` if the layout cannot be created.
    pub fn open(
        root: impl Into<PathBuf>,
        clock: Clock,
        journal: Arc<Journal>,
        default_confidence: u8,
    ) -> StoreResult<Self> {
        let root = root.into();
        for tier in Tier::ALL {
            fs::create_dir_all(root.join(tier.dir_name()))?;
        }

        let store = Self {
            root,
            clock,
            journal,
            index: InvertedIndex::new(),
            inner: RwLock::new(Snapshot::default()),
            faults: None,
            read_only: AtomicBool::new(false),
            sweep_requested: AtomicBool::new(false),
            default_confidence,
        };

        let snapshot = match Snapshot::load(&store.root) {
            Some(snapshot) => snapshot,
            None => store.rebuild_from_listing()?,
        };
        store.index.rebuild(snapshot.records.values());
        *store.inner.write().unwrap() = snapshot;

        Ok(store)
    }

    /// Attach a fault injector (operation names: `record_write`,
    /// `record_read`, `record_delete`, `snapshot_write`).
    #[must_use]
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// The substrate root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The derived inverted index.
    #[must_use]
    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    /// Whether the store has degraded to read-only mode.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    /// Whether an integrity failure has requested a consistency sweep.
    /// Reading clears the request.
    #[must_use]
    pub fn take_sweep_request(&self) -> bool {
        self.sweep_requested.swap(false, Ordering::SeqCst)
    }

    // =========================================================================
    // Record CRUD
    // =========================================================================

    /// Create a record, returning its id.
    ///
    /// Identical content created in the same millisecond maps to the same id;
    /// in that case the existing id is returned unchanged.
    ///
    /// # Errors
    /// `InvalidInput` on oversized content or bad tags, `ReadOnly`/`Storage`
    /// on write failure.
    #[tracing::instrument(skip(self, request), fields(tier = request.tier.index()))]
    pub fn create(&self, request: CreateRecord) -> StoreResult<RecordId> {
        if request.content.is_empty() {
            return Err(StoreError::invalid_input("content must not be empty"));
        }
        if request.content.len() > RECORD_CONTENT_BYTES_MAX {
            return Err(StoreError::invalid_input(format!(
                "content exceeds {RECORD_CONTENT_BYTES_MAX} bytes"
            )));
        }
        validate_tags(&request.tags)?;

        let now = self.clock.now();
        let id = RecordId::generate(request.tier, now, &request.content);
        let confidence = request.confidence.unwrap_or(self.default_confidence);

        let mut inner = self.inner.write().unwrap();
        if inner.records.contains_key(id.as_str()) {
            // Idempotent by contract: same content, same millisecond.
            return Ok(id);
        }

        let rel_path = record_rel_path(request.tier, ValueLevel::from_confidence(confidence), now, &id);
        let abs_path = self.root.join(&rel_path);

        self.guarded_write("record_write", || {
            if let Some(parent) = abs_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&abs_path, request.content.as_bytes())
        })?;

        let meta = RecordMeta {
            id: id.clone(),
            tier: request.tier,
            confidence,
            created_at: now,
            last_accessed_at: None,
            access_count: 0,
            category: request.category,
            subcategory: request.subcategory,
            tags: request.tags,
            preview: content_preview(&request.content),
            keywords: tokenize::extract_record_keywords(&request.content),
            nng_refs: BTreeSet::new(),
            rel_path,
            extra: request.extra,
        };

        inner.records.insert(id.as_str().to_string(), meta.clone());
        if let Err(error) = self.persist(&mut inner) {
            // Abort without partial effect: roll the create back.
            inner.records.remove(id.as_str());
            let _ = fs::remove_file(&abs_path);
            return Err(error);
        }
        self.index.index(&meta);

        self.journal.append(
            JournalKind::Create,
            json!({"record_id": id.as_str(), "tier": request.tier.index()}),
        );
        Ok(id)
    }

    /// Read a record: metadata from the snapshot, content from disk.
    ///
    /// # Errors
    /// `NotFound` if unknown; `Storage` if the content file is unreadable.
    pub fn read(&self, id: &RecordId) -> StoreResult<Record> {
        let meta = self
            .get_meta(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;

        if let Some(faults) = &self.faults {
            if faults.should_inject("record_read").is_some() {
                return Err(StoreError::storage("injected fault during record_read"));
            }
        }

        let content = fs::read_to_string(self.root.join(&meta.rel_path))
            .map_err(|e| StoreError::storage(format!("content file: {e}")))?;

        self.journal
            .append(JournalKind::Read, json!({"record_id": id.as_str()}));
        Ok(Record { meta, content })
    }

    /// Get a record's metadata.
    #[must_use]
    pub fn get_meta(&self, id: &RecordId) -> Option<RecordMeta> {
        self.inner.read().unwrap().records.get(id.as_str()).cloned()
    }

    /// Load a record's content without journaling a read. Used by retrieval
    /// passes that scan many records.
    pub(crate) fn content_of(&self, meta: &RecordMeta) -> StoreResult<String> {
        fs::read_to_string(self.root.join(&meta.rel_path))
            .map_err(|e| StoreError::storage(format!("content file: {e}")))
    }

    /// Apply a metadata patch. Id, creation time, and tier are immutable
    /// here; tier moves go through [`RecordStore::relocate`].
    ///
    /// # Errors
    /// `NotFound` if unknown, `InvalidInput` on bad values.
    pub fn update_metadata(&self, id: &RecordId, patch: MetadataPatch) -> StoreResult<()> {
        if let Some(confidence) = patch.confidence {
            if confidence > CONFIDENCE_MAX {
                return Err(StoreError::invalid_input(format!(
                    "confidence must be 0-{CONFIDENCE_MAX}: got {confidence}"
                )));
            }
        }
        if let Some(tags) = &patch.tags {
            validate_tags(tags)?;
        }

        let mut inner = self.inner.write().unwrap();
        let meta = inner
            .records
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;

        if let Some(confidence) = patch.confidence {
            meta.confidence = confidence;
        }
        if let Some(category) = patch.category {
            meta.category = Some(category);
        }
        if let Some(subcategory) = patch.subcategory {
            meta.subcategory = Some(subcategory);
        }
        if let Some(tags) = patch.tags {
            meta.tags = tags;
        }
        let updated = meta.clone();

        self.persist(&mut inner)?;
        self.index.index(&updated);

        self.journal
            .append(JournalKind::Update, json!({"record_id": id.as_str()}));
        Ok(())
    }

    /// Move a record to a new tier (and confidence), relocating its content
    /// file to the new canonical path. The id is preserved.
    ///
    /// # Errors
    /// `NotFound` if unknown, `ReadOnly`/`Storage` on move failure.
    #[tracing::instrument(skip(self), fields(id = id.as_str(), tier = new_tier.index()))]
    pub fn relocate(&self, id: &RecordId, new_tier: Tier, new_confidence: u8) -> StoreResult<()> {
        debug_assert!(new_confidence <= CONFIDENCE_MAX);

        let mut inner = self.inner.write().unwrap();
        let meta = inner
            .records
            .get(id.as_str())
            .ok_or_else(|| StoreError::not_found(id.as_str()))?
            .clone();

        let new_rel = record_rel_path(
            new_tier,
            ValueLevel::from_confidence(new_confidence),
            meta.created_at,
            id,
        );
        if new_rel != meta.rel_path {
            let old_abs = self.root.join(&meta.rel_path);
            let new_abs = self.root.join(&new_rel);
            self.guarded_write("record_write", || {
                if let Some(parent) = new_abs.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(&old_abs, &new_abs)
            })?;
        }

        let meta = inner.records.get_mut(id.as_str()).expect("checked above");
        meta.tier = new_tier;
        meta.confidence = new_confidence;
        meta.rel_path = new_rel;
        let updated = meta.clone();

        self.persist(&mut inner)?;
        self.index.index(&updated);

        self.journal.append(
            JournalKind::Update,
            json!({"record_id": id.as_str(), "relocated_to_tier": new_tier.index()}),
        );
        Ok(())
    }

    /// Delete a record: content file, metadata, index entries, associations.
    ///
    /// # Errors
    /// `NotFound` if unknown, `ReadOnly`/`Storage` on delete failure.
    pub fn delete(&self, id: &RecordId) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        let meta = inner
            .records
            .get(id.as_str())
            .ok_or_else(|| StoreError::not_found(id.as_str()))?
            .clone();

        let abs_path = self.root.join(&meta.rel_path);
        if abs_path.exists() {
            self.guarded_write("record_delete", || fs::remove_file(&abs_path))?;
        }

        inner.records.remove(id.as_str());
        inner.associations.remove_record(id.as_str());
        self.persist(&mut inner)?;
        self.index.unindex(id.as_str());

        self.journal
            .append(JournalKind::Delete, json!({"record_id": id.as_str()}));
        Ok(())
    }

    /// Record nng back-references; used by the joint attach/detach path.
    pub(crate) fn set_nng_refs(&self, id: &RecordId, refs: BTreeSet<String>) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        let meta = inner
            .records
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        meta.nng_refs = refs;
        self.persist(&mut inner)
    }

    /// List records matching a filter, ordered by creation time.
    #[must_use]
    pub fn list(&self, filter: &RecordFilter) -> Vec<RecordMeta> {
        let inner = self.inner.read().unwrap();
        let mut metas: Vec<RecordMeta> = inner
            .records
            .values()
            .filter(|meta| filter.matches(meta))
            .cloned()
            .collect();
        metas.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        metas
    }

    /// Record count per tier.
    #[must_use]
    pub fn count_by_tier(&self) -> BTreeMap<u8, usize> {
        let inner = self.inner.read().unwrap();
        let mut counts = BTreeMap::new();
        for meta in inner.records.values() {
            *counts.entry(meta.tier.index()).or_insert(0) += 1;
        }
        counts
    }

    /// Stamp access metadata on the given records.
    pub fn mark_accessed(&self, ids: &[RecordId]) -> StoreResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();
        let mut touched = Vec::new();
        for id in ids {
            if let Some(meta) = inner.records.get_mut(id.as_str()) {
                meta.mark_accessed(now);
                touched.push(meta.clone());
            }
        }
        if touched.is_empty() {
            return Ok(());
        }
        self.persist(&mut inner)?;
        for meta in &touched {
            self.index.index(meta);
        }
        Ok(())
    }

    // =========================================================================
    // Associations
    // =========================================================================

    /// Create an association edge between two existing records.
    ///
    /// # Errors
    /// `NotFound` if either end is unknown, `InvalidInput` on a bad weight.
    pub fn create_association(
        &self,
        source: &RecordId,
        target: &RecordId,
        relation: impl Into<String>,
        weight: f64,
    ) -> StoreResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();
        for id in [source, target] {
            if !inner.records.contains_key(id.as_str()) {
                return Err(StoreError::not_found(id.as_str()));
            }
        }
        inner
            .associations
            .insert(source.as_str(), target.as_str(), relation, weight, now)?;
        self.persist(&mut inner)?;

        self.journal.append(
            JournalKind::Update,
            json!({"association": {"source": source.as_str(), "target": target.as_str()}}),
        );
        Ok(())
    }

    /// Records reachable through association edges.
    pub fn get_related(&self, id: &RecordId, max_depth: Option<usize>) -> Vec<RelatedRecord> {
        let mut inner = self.inner.write().unwrap();
        let related = inner.associations.traverse(id.as_str(), max_depth);
        // Persisting here is best-effort: traversal only mutates the prune
        // queue, which the next maintenance run rebuilds anyway.
        let _ = self.persist(&mut inner);
        related
    }

    /// Drop association edges queued for pruning. Returns how many.
    pub fn apply_association_pruning(&self) -> StoreResult<usize> {
        let mut inner = self.inner.write().unwrap();
        let removed = inner.associations.apply_pruning();
        if removed > 0 {
            self.persist(&mut inner)?;
        }
        Ok(removed)
    }

    /// Total association edges.
    #[must_use]
    pub fn association_count(&self) -> usize {
        self.inner.read().unwrap().associations.edge_count()
    }

    /// Direct association neighbors of a record (outgoing edges only).
    #[must_use]
    pub fn association_neighbors(&self, id: &RecordId) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .associations
            .neighbors(id.as_str())
            .into_iter()
            .map(|(target, _)| target.to_string())
            .collect()
    }

    // =========================================================================
    // Navigation and Counters
    // =========================================================================

    /// Record a search in the navigation state.
    pub fn record_search(&self, query: &str, results_count: usize) {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();
        inner.navigation.record_search(query, results_count, now);
        let _ = self.persist(&mut inner);
    }

    /// Record a navigation failure: navigation state, counter, journal.
    pub fn record_nav_failure(&self, path: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.navigation.record_nav_failure(path);
        inner.counters.nav_fail_counter += 1;
        let _ = self.persist(&mut inner);
        self.journal
            .append(JournalKind::NavFail, json!({"path": path}));
    }

    /// Snapshot of the navigation state.
    #[must_use]
    pub fn navigation(&self) -> NavigationState {
        self.inner.read().unwrap().navigation.clone()
    }

    /// Mutate the navigation state.
    pub fn with_navigation(&self, f: impl FnOnce(&mut NavigationState)) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        f(&mut inner.navigation);
        self.persist(&mut inner)
    }

    /// Snapshot of the coordinator counters.
    #[must_use]
    pub fn counters(&self) -> CounterState {
        self.inner.read().unwrap().counters.clone()
    }

    /// Mutate the coordinator counters and persist them.
    ///
    /// # Errors
    /// `Storage` if the snapshot cannot be written; fatal at shutdown.
    pub fn update_counters(&self, f: impl FnOnce(&mut CounterState)) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        f(&mut inner.counters);
        self.persist(&mut inner)
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Sweep expired working records.
    ///
    /// Iterates the file listing (not the index) to tolerate index drift:
    /// orphan files older than the horizon are removed even when no metadata
    /// mentions them.
    ///
    /// # Errors
    /// `ReadOnly`/`Storage` on delete failure.
    #[tracing::instrument(skip(self))]
    pub fn cleanup_working(&self, max_age: Duration) -> StoreResult<CleanupReport> {
        let now = self.clock.now();
        let working_dir = self.root.join(Tier::Working.dir_name());
        let mut report = CleanupReport::default();

        let mut files = Vec::new();
        collect_files(&working_dir, &mut files)?;

        let mut inner = self.inner.write().unwrap();
        for path in files {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(id) = RecordId::parse(stem) else {
                continue;
            };

            match inner.records.get(id.as_str()).cloned() {
                Some(meta) => {
                    if !meta.is_expired(now, max_age) {
                        let reason = if meta.last_accessed_at.is_some() {
                            "accessed"
                        } else {
                            "within age horizon"
                        };
                        report.skipped.push((id.as_str().to_string(), reason.to_string()));
                        continue;
                    }
                    if !meta.nng_refs.is_empty() {
                        report
                            .skipped
                            .push((id.as_str().to_string(), "attached to concept node".to_string()));
                        continue;
                    }

                    self.guarded_write("record_delete", || fs::remove_file(&path))?;
                    inner.records.remove(id.as_str());
                    inner.associations.remove_record(id.as_str());
                    self.index.unindex(id.as_str());
                    self.journal.append(
                        JournalKind::Delete,
                        json!({"record_id": id.as_str(), "reason": "working_expired"}),
                    );
                    report.deleted.push(id.as_str().to_string());
                }
                None => {
                    // Index drift: a file nothing refers to. Expire by the
                    // timestamp carried in its id.
                    let created = id.created_at().unwrap_or(now);
                    if now - created > max_age {
                        self.guarded_write("record_delete", || fs::remove_file(&path))?;
                        self.journal.append(
                            JournalKind::Delete,
                            json!({"record_id": id.as_str(), "reason": "orphan_expired"}),
                        );
                        report.deleted.push(id.as_str().to_string());
                    }
                }
            }
        }

        inner.navigation.last_cleanup = Some(now);
        self.persist(&mut inner)?;
        Ok(report)
    }

    // =========================================================================
    // Status and Consistency
    // =========================================================================

    /// Status summary for `get_status`.
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        let inner = self.inner.read().unwrap();
        let mut records_by_tier = BTreeMap::new();
        for tier in Tier::ALL {
            records_by_tier.insert(tier.index(), 0usize);
        }
        for meta in inner.records.values() {
            *records_by_tier.entry(meta.tier.index()).or_insert(0) += 1;
        }
        StoreStatus {
            total_records: inner.records.len(),
            records_by_tier,
            association_count: inner.associations.edge_count(),
            hot_topics: inner.navigation.top_topics(5),
            last_cleanup: inner.navigation.last_cleanup,
            last_backup: inner.navigation.last_backup,
            read_only: self.is_read_only(),
        }
    }

    /// Check index/metadata round-trip consistency (both directions) and
    /// content-file presence. Returns human-readable issues.
    #[must_use]
    pub fn verify_consistency(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut issues = Vec::new();

        let live: BTreeSet<String> = inner.records.keys().cloned().collect();
        for id in self.index.indexed_ids() {
            if !live.contains(&id) {
                issues.push(format!("index entry without live record: {id}"));
            }
        }
        for meta in inner.records.values() {
            for key in meta.tags.iter().chain(meta.keywords.iter()) {
                let hit = self.index.lookup(key);
                if !hit.exact.contains(&meta.id.as_str().to_string()) {
                    issues.push(format!("record {} missing from index key {key}", meta.id));
                }
            }
            if !self.root.join(&meta.rel_path).exists() {
                issues.push(format!("record {} missing content file", meta.id));
            }
        }
        issues
    }

    /// Flag that an integrity failure happened; the coordinator schedules a
    /// consistency sweep on its next opportunity.
    pub fn request_sweep(&self) {
        self.sweep_requested.store(true, Ordering::SeqCst);
    }

    /// Persist the snapshot now. Used at shutdown, where failure is fatal.
    ///
    /// # Errors
    /// `Storage` if the snapshot cannot be written.
    pub fn flush(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();
        self.persist(&mut inner)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn persist(&self, inner: &mut Snapshot) -> StoreResult<()> {
        inner.updated_at = Some(self.clock.now());
        let snapshot = inner.clone();
        self.guarded_write("snapshot_write", || snapshot.save_atomic(&self.root))
    }

    /// Write with the retry-once discipline. A second failure degrades the
    /// store to read-only for the rest of the process lifetime.
    fn guarded_write<T>(
        &self,
        op: &'static str,
        mut f: impl FnMut() -> std::io::Result<T>,
    ) -> StoreResult<T> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }

        let mut attempt = || -> std::io::Result<T> {
            if let Some(faults) = &self.faults {
                if faults.should_inject(op).is_some() {
                    return Err(std::io::Error::other(format!("injected fault during {op}")));
                }
            }
            f()
        };

        match attempt() {
            Ok(value) => Ok(value),
            Err(first) => {
                tracing::warn!(op, error = %first, "store write failed, retrying");
                match attempt() {
                    Ok(value) => Ok(value),
                    Err(second) => {
                        self.read_only.store(true, Ordering::SeqCst);
                        tracing::error!(op, error = %second, "store write failed twice, now read-only");
                        Err(StoreError::storage(format!("{op}: {second}")))
                    }
                }
            }
        }
    }

    /// Last-resort metadata rebuild from the content-file listing.
    fn rebuild_from_listing(&self) -> StoreResult<Snapshot> {
        let mut snapshot = Snapshot::default();
        let mut files = Vec::new();
        for tier in Tier::ALL {
            collect_files(&self.root.join(tier.dir_name()), &mut files)?;
        }

        for path in files {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(id) = RecordId::parse(stem) else {
                continue;
            };
            let Ok(content) = fs::read_to_string(&path) else {
                tracing::warn!(path = %path.display(), "unreadable record file skipped in rebuild");
                continue;
            };
            let rel_path = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();

            let meta = RecordMeta {
                tier: id.created_tier(),
                confidence: self.default_confidence,
                created_at: id.created_at().unwrap_or_else(|| self.clock.now()),
                last_accessed_at: None,
                access_count: 0,
                category: None,
                subcategory: None,
                tags: BTreeSet::new(),
                preview: content_preview(&content),
                keywords: tokenize::extract_record_keywords(&content),
                nng_refs: BTreeSet::new(),
                rel_path,
                extra: BTreeMap::new(),
                id: id.clone(),
            };
            snapshot.records.insert(id.as_str().to_string(), meta);
        }

        if !snapshot.records.is_empty() {
            tracing::info!(count = snapshot.records.len(), "metadata rebuilt from file listing");
        }
        Ok(snapshot)
    }
}

/// Canonical content path relative to the root.
fn record_rel_path(tier: Tier, level: ValueLevel, at: DateTime<Utc>, id: &RecordId) -> String {
    let date = at.format("%Y/%m/%d");
    if tier.uses_value_level() {
        format!("{}/{}/{}/{}.txt", tier.dir_name(), level.dir_name(), date, id)
    } else {
        format!("{}/{}/{}.txt", tier.dir_name(), date, id)
    }
}

/// Recursively collect files under `dir` (missing dirs are fine).
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> StoreResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mnema_core::sim::{DeterministicRng, FaultConfig, FaultInjectorBuilder, FaultType, SimClock};

    fn sim_clock() -> Clock {
        Clock::Sim(SimClock::at_datetime(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn open_store(dir: &Path) -> RecordStore {
        let clock = sim_clock();
        let journal = Arc::new(Journal::open(dir, clock.clone()).unwrap());
        RecordStore::open(dir, clock, journal, 70).unwrap()
    }

    #[test]
    fn test_first_run_creates_tier_layout() {
        let dir = tempfile::tempdir().unwrap();
        let _store = open_store(dir.path());

        for name in ["meta_cognitive", "integrated", "classified", "working"] {
            assert!(dir.path().join(name).is_dir(), "{name} missing");
        }
    }

    #[test]
    fn test_create_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let id = store
            .create(
                CreateRecord::new("The substrate guarantees at-most-one writer.", Tier::Classified)
                    .with_tags(["concurrency"]),
            )
            .unwrap();

        assert!(id.as_str().starts_with("M2_"));
        let record = store.read(&id).unwrap();
        assert_eq!(record.content, "The substrate guarantees at-most-one writer.");
        assert_eq!(record.meta.tier, Tier::Classified);
        assert!(record.meta.tags.contains("concurrency"));
    }

    #[test]
    fn test_create_is_idempotent_on_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let a = store.create(CreateRecord::new("same", Tier::Working)).unwrap();
        let b = store.create(CreateRecord::new("same", Tier::Working)).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.count_by_tier().get(&3), Some(&1));
    }

    #[test]
    fn test_classified_path_has_value_level() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let id = store
            .create(CreateRecord::new("high value", Tier::Classified).with_confidence(90))
            .unwrap();
        let meta = store.get_meta(&id).unwrap();
        assert!(meta.rel_path.starts_with("classified/high/2026/03/01/"));

        let id = store
            .create(CreateRecord::new("working item", Tier::Working))
            .unwrap();
        let meta = store.get_meta(&id).unwrap();
        assert!(meta.rel_path.starts_with("working/2026/03/01/"));
    }

    #[test]
    fn test_update_metadata_rejects_bad_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let id = store.create(CreateRecord::new("x", Tier::Working)).unwrap();

        let err = store
            .update_metadata(&id, MetadataPatch::new().with_confidence(150))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }

    #[test]
    fn test_update_metadata_reindexes_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let id = store
            .create(CreateRecord::new("x", Tier::Working).with_tags(["old"]))
            .unwrap();

        store
            .update_metadata(
                &id,
                MetadataPatch::new().with_tags(["new".to_string()].into_iter().collect()),
            )
            .unwrap();

        assert!(store.index().lookup("old").is_empty());
        assert_eq!(store.index().lookup("new").exact.len(), 1);
    }

    #[test]
    fn test_relocate_moves_file_and_preserves_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let id = store.create(CreateRecord::new("promoted", Tier::Working)).unwrap();
        let old_path = dir.path().join(&store.get_meta(&id).unwrap().rel_path);

        store.relocate(&id, Tier::Classified, 80).unwrap();

        let meta = store.get_meta(&id).unwrap();
        assert_eq!(meta.tier, Tier::Classified);
        assert_eq!(meta.confidence, 80);
        assert!(meta.rel_path.starts_with("classified/high/"));
        assert!(!old_path.exists());
        assert!(dir.path().join(&meta.rel_path).exists());
        assert_eq!(meta.id, id, "id preserved across tiers");
    }

    #[test]
    fn test_delete_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let id = store
            .create(CreateRecord::new("to delete", Tier::Working).with_tags(["gone"]))
            .unwrap();
        let path = dir.path().join(&store.get_meta(&id).unwrap().rel_path);

        store.delete(&id).unwrap();

        assert!(store.get_meta(&id).is_none());
        assert!(!path.exists());
        assert!(store.index().lookup("gone").is_empty());
        assert!(matches!(store.read(&id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_list_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create(CreateRecord::new("a", Tier::Working).with_tags(["keep"]))
            .unwrap();
        store.create(CreateRecord::new("b", Tier::Classified)).unwrap();

        assert_eq!(store.list(&RecordFilter::new()).len(), 2);
        assert_eq!(store.list(&RecordFilter::new().with_tier(Tier::Working)).len(), 1);
        assert_eq!(store.list(&RecordFilter::new().with_tag("keep")).len(), 1);
        assert_eq!(store.list(&RecordFilter::new().with_tag("missing")).len(), 0);
    }

    #[test]
    fn test_cleanup_deletes_expired_working_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let ids: Vec<RecordId> = (0..3)
            .map(|i| {
                store
                    .create(CreateRecord::new(format!("working {i}"), Tier::Working))
                    .unwrap()
            })
            .collect();

        // 25 hours pass.
        store.clock.as_sim().unwrap().advance_secs(25 * 3600);

        let report = store.cleanup_working(Duration::hours(24)).unwrap();
        assert_eq!(report.deleted.len(), 3);
        for id in &ids {
            assert!(store.get_meta(id).is_none());
            assert!(store.index().lookup(id.as_str()).is_empty());
        }

        // One delete journal line per record.
        let deletes = store
            .journal
            .read_today()
            .into_iter()
            .filter(|e| e.kind == JournalKind::Delete)
            .count();
        assert_eq!(deletes, 3);
    }

    #[test]
    fn test_cleanup_skips_accessed_and_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let old_accessed = store
            .create(CreateRecord::new("old but read", Tier::Working))
            .unwrap();
        store.mark_accessed(std::slice::from_ref(&old_accessed)).unwrap();
        store.clock.as_sim().unwrap().advance_secs(25 * 3600);
        let fresh = store.create(CreateRecord::new("fresh", Tier::Working)).unwrap();

        let report = store.cleanup_working(Duration::hours(24)).unwrap();

        assert!(report.deleted.is_empty());
        let skipped: Vec<&str> = report.skipped.iter().map(|(id, _)| id.as_str()).collect();
        assert!(skipped.contains(&old_accessed.as_str()));
        assert!(skipped.contains(&fresh.as_str()));
    }

    #[test]
    fn test_association_roundtrip_and_missing_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let a = store.create(CreateRecord::new("a", Tier::Classified)).unwrap();
        let b = store.create(CreateRecord::new("b", Tier::Classified)).unwrap();

        store.create_association(&a, &b, "related", 0.8).unwrap();
        let related = store.get_related(&a, None);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].record_id, b.as_str());

        let ghost = RecordId::generate(Tier::Working, store.clock.now(), "ghost");
        assert!(matches!(
            store.create_association(&a, &ghost, "related", 0.5),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = open_store(dir.path());
            store
                .create(CreateRecord::new("persistent", Tier::Classified).with_tags(["durable"]))
                .unwrap()
        };

        let store = open_store(dir.path());
        let record = store.read(&id).unwrap();
        assert_eq!(record.content, "persistent");
        assert_eq!(store.index().lookup("durable").exact.len(), 1);
    }

    #[test]
    fn test_rebuild_from_listing_after_snapshot_loss() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = open_store(dir.path());
            store.create(CreateRecord::new("survivor content", Tier::Working)).unwrap()
        };

        fs::remove_file(dir.path().join(snapshot::SNAPSHOT_FILE_NAME)).unwrap();

        let store = open_store(dir.path());
        let meta = store.get_meta(&id).expect("rebuilt from listing");
        assert_eq!(meta.tier, Tier::Working);
        assert!(!meta.keywords.is_empty());
    }

    #[test]
    fn test_write_failure_twice_degrades_to_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let faults = Arc::new(
            FaultInjectorBuilder::new(DeterministicRng::new(9))
                .with_fault(FaultConfig::new(FaultType::StoreWriteFail, 1.0).with_filter("record_write"))
                .build(),
        );
        let clock = sim_clock();
        let journal = Arc::new(Journal::open(dir.path(), clock.clone()).unwrap());
        let store = RecordStore::open(dir.path(), clock, journal, 70)
            .unwrap()
            .with_faults(faults);

        let err = store.create(CreateRecord::new("doomed", Tier::Working)).unwrap_err();
        assert!(matches!(err, StoreError::Storage { .. }));
        assert!(store.is_read_only());

        let err = store.create(CreateRecord::new("after", Tier::Working)).unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly));
    }

    #[test]
    fn test_verify_consistency_clean_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store
            .create(CreateRecord::new("consistent", Tier::Classified).with_tags(["ok"]))
            .unwrap();
        assert!(store.verify_consistency().is_empty());
    }

    #[test]
    fn test_counters_persist() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path());
            store
                .update_counters(|c| {
                    c.session_count = 41;
                    c.nav_fail_counter = 2;
                })
                .unwrap();
        }
        let store = open_store(dir.path());
        assert_eq!(store.counters().session_count, 41);
        assert_eq!(store.counters().nav_fail_counter, 2);
    }
}
