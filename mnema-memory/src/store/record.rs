//! Record Types
//!
//! A record is an immutable content blob plus mutable metadata. Content lives
//! in one file on disk; metadata lives only in the snapshot document and is
//! what the inverted index and ranking read.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{StoreError, StoreResult};
use crate::constants::{
    CONFIDENCE_HIGH_THRESHOLD, CONFIDENCE_MAX, CONFIDENCE_MEDIUM_THRESHOLD,
    RECORD_ID_HASH_CHARS_COUNT, RECORD_ID_TIMESTAMP_DIGITS_COUNT, RECORD_PREVIEW_CHARS_MAX,
    RECORD_TAGS_COUNT_MAX, RECORD_TAG_BYTES_MAX, TIER_PRIORITY_CLASSIFIED,
    TIER_PRIORITY_INTEGRATED, TIER_PRIORITY_META, TIER_PRIORITY_WORKING,
};

// =============================================================================
// Tier
// =============================================================================

/// Lifecycle class of a record.
///
/// The tier fixes the ranking priority and decides the on-disk layout and
/// cleanup behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Tier 0: meta-cognitive
    MetaCognitive,
    /// Tier 1: integrated
    Integrated,
    /// Tier 2: classified
    Classified,
    /// Tier 3: working
    Working,
}

impl Tier {
    /// All tiers, ordered by index.
    pub const ALL: [Tier; 4] = [
        Tier::MetaCognitive,
        Tier::Integrated,
        Tier::Classified,
        Tier::Working,
    ];

    /// Parse a tier index.
    ///
    /// # Errors
    /// Returns `InvalidTier` for indices outside 0..=3.
    pub fn from_index(index: u8) -> StoreResult<Self> {
        match index {
            0 => Ok(Self::MetaCognitive),
            1 => Ok(Self::Integrated),
            2 => Ok(Self::Classified),
            3 => Ok(Self::Working),
            tier => Err(StoreError::InvalidTier { tier }),
        }
    }

    /// The numeric index (0..=3).
    #[must_use]
    pub fn index(&self) -> u8 {
        match self {
            Self::MetaCognitive => 0,
            Self::Integrated => 1,
            Self::Classified => 2,
            Self::Working => 3,
        }
    }

    /// Ranking priority weight.
    #[must_use]
    pub fn priority(&self) -> u32 {
        match self {
            Self::MetaCognitive => TIER_PRIORITY_META,
            Self::Integrated => TIER_PRIORITY_INTEGRATED,
            Self::Classified => TIER_PRIORITY_CLASSIFIED,
            Self::Working => TIER_PRIORITY_WORKING,
        }
    }

    /// Directory name under the substrate root.
    #[must_use]
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::MetaCognitive => "meta_cognitive",
            Self::Integrated => "integrated",
            Self::Classified => "classified",
            Self::Working => "working",
        }
    }

    /// Whether this tier's layout has a value-level subdirectory.
    #[must_use]
    pub fn uses_value_level(&self) -> bool {
        matches!(self, Self::Classified)
    }
}

impl TryFrom<u8> for Tier {
    type Error = StoreError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::from_index(index)
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.index()
    }
}

// =============================================================================
// ValueLevel
// =============================================================================

/// Display/retention bucket, derived from confidence at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueLevel {
    /// Confidence ≥ 80
    High,
    /// 50 ≤ confidence < 80
    Medium,
    /// Confidence < 50
    Low,
}

impl ValueLevel {
    /// Derive the value level from a confidence score.
    #[must_use]
    pub fn from_confidence(confidence: u8) -> Self {
        if confidence >= CONFIDENCE_HIGH_THRESHOLD {
            Self::High
        } else if confidence >= CONFIDENCE_MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Directory name used in the classified-tier layout.
    #[must_use]
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for ValueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

// =============================================================================
// RecordId
// =============================================================================

/// Record id of the form `M{tier}_{yyyymmddhhmmssfff}_{hash6}`.
///
/// The hash segment is the first 6 hex chars of the SHA-256 content digest,
/// so identical content created in the same millisecond maps to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate an id for the given tier, creation time, and content.
    #[must_use]
    pub fn generate(tier: Tier, at: DateTime<Utc>, content: &str) -> Self {
        let timestamp = at.format("%Y%m%d%H%M%S%3f");
        let digest = Sha256::digest(content.as_bytes());
        let hash6: String = digest
            .iter()
            .flat_map(|b| [b >> 4, b & 0xf])
            .take(RECORD_ID_HASH_CHARS_COUNT)
            .map(|nibble| char::from_digit(u32::from(nibble), 16).unwrap())
            .collect();

        let id = Self(format!("M{}_{timestamp}_{hash6}", tier.index()));

        // Postcondition
        debug_assert!(Self::parse(id.as_str()).is_ok(), "generated id must parse");
        id
    }

    /// Parse and validate an id string.
    ///
    /// # Errors
    /// Returns `InvalidInput` if the string does not match
    /// `M[0-3]_\d{17}_[0-9a-f]{6}`.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let invalid = || StoreError::invalid_input(format!("malformed record id: {raw}"));

        let rest = raw.strip_prefix('M').ok_or_else(invalid)?;
        let mut parts = rest.splitn(3, '_');
        let tier_part = parts.next().ok_or_else(invalid)?;
        let ts_part = parts.next().ok_or_else(invalid)?;
        let hash_part = parts.next().ok_or_else(invalid)?;

        if tier_part.len() != 1 || !matches!(tier_part.as_bytes()[0], b'0'..=b'3') {
            return Err(invalid());
        }
        if ts_part.len() != RECORD_ID_TIMESTAMP_DIGITS_COUNT
            || !ts_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if hash_part.len() != RECORD_ID_HASH_CHARS_COUNT
            || !hash_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid());
        }

        Ok(Self(raw.to_string()))
    }

    /// The tier digit encoded in the id.
    ///
    /// After a `relocate` the metadata tier is authoritative; the digit only
    /// records the tier at creation.
    #[must_use]
    pub fn created_tier(&self) -> Tier {
        let digit = self.0.as_bytes()[1] - b'0';
        Tier::from_index(digit).expect("validated at construction")
    }

    /// The creation timestamp encoded in the id.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let ts = &self.0[2..2 + RECORD_ID_TIMESTAMP_DIGITS_COUNT];
        let naive = NaiveDateTime::parse_from_str(&ts[..14], "%Y%m%d%H%M%S").ok()?;
        let millis: i64 = ts[14..].parse().ok()?;
        Some(naive.and_utc() + Duration::milliseconds(millis))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Mutable metadata of a record, persisted in the snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Record id
    pub id: RecordId,
    /// Current tier (authoritative; may differ from the id digit after moves)
    pub tier: Tier,
    /// Confidence in [0, 100]
    pub confidence: u8,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last retrieval stamp
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Number of retrievals that surfaced this record
    pub access_count: u64,
    /// Category label
    pub category: Option<String>,
    /// Subcategory label
    pub subcategory: Option<String>,
    /// Explicit tags
    pub tags: BTreeSet<String>,
    /// First 200 chars of content, cached for bundles and status output
    pub preview: String,
    /// Extracted content keywords feeding the inverted index
    pub keywords: Vec<String>,
    /// Concept nodes this record is linked from
    pub nng_refs: BTreeSet<String>,
    /// Content file path relative to the substrate root
    pub rel_path: String,
    /// Caller-supplied opaque metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RecordMeta {
    /// Value level derived from the current confidence.
    #[must_use]
    pub fn value_level(&self) -> ValueLevel {
        ValueLevel::from_confidence(self.confidence)
    }

    /// Age relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Whether a working record has outlived the cleanup horizon unaccessed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.tier == Tier::Working && self.last_accessed_at.is_none() && self.age(now) > max_age
    }

    /// Stamp a retrieval.
    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = Some(now);
    }
}

/// Truncate content to the cached preview length.
#[must_use]
pub fn content_preview(content: &str) -> String {
    truncate_chars(content, RECORD_PREVIEW_CHARS_MAX)
}

/// Truncate a string to at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// A record rehydrated from disk: metadata plus full content.
#[derive(Debug, Clone)]
pub struct Record {
    /// Metadata from the snapshot
    pub meta: RecordMeta,
    /// Full content from the record file
    pub content: String,
}

// =============================================================================
// Metadata Patch
// =============================================================================

/// A partial metadata update.
///
/// Id, creation time, and tier are not patchable; tier moves go through
/// `relocate`.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    /// New confidence, if changing
    pub confidence: Option<u8>,
    /// New category, if changing
    pub category: Option<String>,
    /// New subcategory, if changing
    pub subcategory: Option<String>,
    /// Full replacement tag set, if changing
    pub tags: Option<BTreeSet<String>>,
}

impl MetadataPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = Some(confidence);
        self
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

    /// Replace the tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: BTreeSet<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Whether the patch changes anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.confidence.is_none()
            && self.category.is_none()
            && self.subcategory.is_none()
            && self.tags.is_none()
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate a caller-supplied confidence value.
///
/// # Errors
/// Returns `InvalidInput` if outside [0, 100]. Internal adjustments clamp
/// instead (see `clamp_confidence`).
pub fn validate_confidence(confidence: i64) -> StoreResult<u8> {
    if !(i64::from(crate::constants::CONFIDENCE_MIN)..=i64::from(CONFIDENCE_MAX))
        .contains(&confidence)
    {
        return Err(StoreError::invalid_input(format!(
            "confidence must be 0-{CONFIDENCE_MAX}: got {confidence}"
        )));
    }
    Ok(confidence as u8)
}

/// Clamp an internally adjusted confidence to the scale.
#[must_use]
pub fn clamp_confidence(confidence: i64) -> u8 {
    confidence.clamp(0, i64::from(CONFIDENCE_MAX)) as u8
}

/// Validate a caller-supplied tag set.
///
/// # Errors
/// Returns `InvalidInput` on too many tags, empty tags, or oversized tags.
pub fn validate_tags(tags: &BTreeSet<String>) -> StoreResult<()> {
    if tags.len() > RECORD_TAGS_COUNT_MAX {
        return Err(StoreError::invalid_input(format!(
            "too many tags: {} (max {RECORD_TAGS_COUNT_MAX})",
            tags.len()
        )));
    }
    for tag in tags {
        if tag.is_empty() {
            return Err(StoreError::invalid_input("empty tag"));
        }
        if tag.len() > RECORD_TAG_BYTES_MAX {
            return Err(StoreError::invalid_input(format!(
                "tag exceeds {RECORD_TAG_BYTES_MAX} bytes"
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
