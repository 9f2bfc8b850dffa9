//! Operation Journal
//!
//! One JSON object per line in `logs/<yyyymmdd>.jsonl`. The journal is a data
//! artifact consumed by status reporting and tests; process-level diagnostics
//! go through `tracing` instead.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;

/// Kinds of journaled operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    /// Record created
    Create,
    /// Record content read
    Read,
    /// Record or node metadata updated
    Update,
    /// Record or node deleted
    Delete,
    /// Record attached to a concept node
    Attach,
    /// Record detached from a concept node
    Detach,
    /// Sandbox navigation referenced a missing path
    NavFail,
    /// Sandbox or maintenance stage entered
    StageBegin,
    /// Sandbox or maintenance stage left
    StageEnd,
    /// Maintenance run started
    MaintenanceBegin,
    /// Maintenance run finished
    MaintenanceEnd,
}

/// A single journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the operation happened
    pub timestamp: DateTime<Utc>,
    /// What kind of operation it was
    pub kind: JournalKind,
    /// Operation payload (ids, paths, counts)
    pub data: Value,
}

/// Append-only daily journal.
///
/// Append failures are reported via `tracing::warn` and never fail the
/// operation being journaled; only shutdown persistence is allowed to be
/// fatal.
#[derive(Debug)]
pub struct Journal {
    dir: PathBuf,
    clock: Clock,
    write_lock: Mutex<()>,
}

impl Journal {
    /// Open (creating if needed) the journal directory under `root/logs`.
    ///
    /// # Errors
    /// Returns `std::io::Error` if the directory cannot be created.
    pub fn open(root: &Path, clock: Clock) -> std::io::Result<Self> {
        let dir = root.join("logs");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            clock,
            write_lock: Mutex::new(()),
        })
    }

    /// Append an entry for the current day.
    pub fn append(&self, kind: JournalKind, data: Value) {
        let entry = JournalEntry {
            timestamp: self.clock.now(),
            kind,
            data,
        };

        let _guard = self.write_lock.lock().unwrap();
        if let Err(error) = self.append_line(&entry) {
            tracing::warn!(?kind, %error, "journal append failed");
        }
    }

    fn append_line(&self, entry: &JournalEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_path(entry.timestamp.date_naive()))?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())
    }

    /// Read all entries for the given day. Malformed lines are skipped.
    #[must_use]
    pub fn read_day(&self, day: NaiveDate) -> Vec<JournalEntry> {
        let Ok(text) = fs::read_to_string(self.day_path(day)) else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Read today's entries.
    #[must_use]
    pub fn read_today(&self) -> Vec<JournalEntry> {
        self.read_day(self.clock.now().date_naive())
    }

    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", day.format("%Y%m%d")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sim_clock() -> Clock {
        Clock::sim_at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path(), sim_clock()).unwrap();

        journal.append(JournalKind::Create, json!({"record_id": "M3_x"}));
        journal.append(JournalKind::Delete, json!({"record_id": "M3_x"}));

        let entries = journal.read_today();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, JournalKind::Create);
        assert_eq!(entries[1].kind, JournalKind::Delete);
        assert_eq!(entries[1].data["record_id"], "M3_x");
    }

    #[test]
    fn test_day_file_naming() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path(), sim_clock()).unwrap();

        journal.append(JournalKind::NavFail, json!({"path": "1.3"}));

        assert!(dir.path().join("logs/20260301.jsonl").exists());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let text = serde_json::to_string(&JournalKind::MaintenanceBegin).unwrap();
        assert_eq!(text, "\"maintenance_begin\"");
    }

    #[test]
    fn test_read_missing_day_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path(), sim_clock()).unwrap();
        let day = NaiveDate::from_ymd_opt(1999, 1, 1).unwrap();
        assert!(journal.read_day(day).is_empty());
    }
}
