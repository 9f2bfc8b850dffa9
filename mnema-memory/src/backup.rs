//! Backup and Restore
//!
//! A backup is a plain directory copy of the authoritative state: the
//! snapshot document, the graph, and the tier directories. Backups land in
//! `backups/<timestamp>/` and the oldest are pruned beyond the keep limit.

use std::fs;
use std::path::{Path, PathBuf};

use crate::clock::Clock;
use crate::store::error::{StoreError, StoreResult};
use crate::store::record::Tier;
use crate::store::snapshot::SNAPSHOT_FILE_NAME;

/// What a backup directory contains, besides the snapshot file.
fn backed_up_dirs() -> Vec<&'static str> {
    let mut dirs: Vec<&'static str> = Tier::ALL.iter().map(Tier::dir_name).collect();
    dirs.push("graph");
    dirs
}

/// Create a backup under `root/backups/<yyyymmdd_hhmmss>` and prune old
/// backups beyond `keep_max`. Returns the backup directory.
///
/// # Errors
/// Returns `Storage` on any copy failure.
pub fn create_backup(root: &Path, clock: &Clock, keep_max: usize) -> StoreResult<PathBuf> {
    let stamp = clock.now().format("%Y%m%d_%H%M%S").to_string();
    let backup_dir = root.join("backups").join(&stamp);
    fs::create_dir_all(&backup_dir)?;

    let snapshot = root.join(SNAPSHOT_FILE_NAME);
    if snapshot.exists() {
        fs::copy(&snapshot, backup_dir.join(SNAPSHOT_FILE_NAME))?;
    }
    for dir in backed_up_dirs() {
        let src = root.join(dir);
        if src.exists() {
            copy_dir_recursive(&src, &backup_dir.join(dir))?;
        }
    }

    prune_backups(&root.join("backups"), keep_max)?;
    tracing::info!(backup = %backup_dir.display(), "backup created");
    Ok(backup_dir)
}

/// Restore the store state from a backup directory, replacing the current
/// snapshot, graph, and tier directories.
///
/// # Errors
/// Returns `InvalidInput` if `backup_dir` is not a backup; `Storage` on copy
/// failure.
pub fn restore_backup(root: &Path, backup_dir: &Path) -> StoreResult<()> {
    if !backup_dir.join(SNAPSHOT_FILE_NAME).exists() {
        return Err(StoreError::invalid_input(format!(
            "not a backup directory: {}",
            backup_dir.display()
        )));
    }

    for dir in backed_up_dirs() {
        let target = root.join(dir);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        let src = backup_dir.join(dir);
        if src.exists() {
            copy_dir_recursive(&src, &target)?;
        } else {
            fs::create_dir_all(&target)?;
        }
    }
    fs::copy(
        backup_dir.join(SNAPSHOT_FILE_NAME),
        root.join(SNAPSHOT_FILE_NAME),
    )?;

    tracing::info!(backup = %backup_dir.display(), "backup restored");
    Ok(())
}

/// List backup directories, oldest first.
#[must_use]
pub fn list_backups(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root.join("backups")) else {
        return Vec::new();
    };
    let mut backups: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    backups.sort();
    backups
}

fn prune_backups(backups_dir: &Path, keep_max: usize) -> StoreResult<()> {
    let Ok(entries) = fs::read_dir(backups_dir) else {
        return Ok(());
    };
    let mut backups: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    backups.sort();

    while backups.len() > keep_max {
        let oldest = backups.remove(0);
        fs::remove_dir_all(&oldest)?;
        tracing::info!(backup = %oldest.display(), "old backup pruned");
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> StoreResult<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
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
    use crate::journal::Journal;
    use crate::store::record::RecordId;
    use crate::store::{CreateRecord, RecordStore};
    use chrono::{TimeZone, Utc};
    use mnema_core::sim::SimClock;
    use std::sync::Arc;

    fn sim_clock() -> Clock {
        Clock::Sim(SimClock::at_datetime(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn open_store(dir: &Path, clock: Clock) -> RecordStore {
        let journal = Arc::new(Journal::open(dir, clock.clone()).unwrap());
        RecordStore::open(dir, clock, journal, 70).unwrap()
    }

    #[test]
    fn test_backup_then_restore_is_isomorphic() {
        let dir = tempfile::tempdir().unwrap();
        let clock = sim_clock();

        let id: RecordId;
        {
            let store = open_store(dir.path(), clock.clone());
            id = store
                .create(CreateRecord::new("precious content", Tier::Classified).with_tags(["keep"]))
                .unwrap();
        }

        let backup = create_backup(dir.path(), &clock, 10).unwrap();

        // Wreck the live state.
        {
            let store = open_store(dir.path(), clock.clone());
            store.delete(&id).unwrap();
            assert!(store.get_meta(&id).is_none());
        }

        restore_backup(dir.path(), &backup).unwrap();

        let store = open_store(dir.path(), clock);
        let record = store.read(&id).unwrap();
        assert_eq!(record.content, "precious content");
        assert!(record.meta.tags.contains("keep"));
        assert_eq!(store.index().lookup("keep").exact.len(), 1);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let clock = sim_clock();
        let _store = open_store(dir.path(), clock.clone());

        for _ in 0..4 {
            create_backup(dir.path(), &clock, 3).unwrap();
            clock.as_sim().unwrap().advance_secs(60);
        }

        let backups = list_backups(dir.path());
        assert_eq!(backups.len(), 3);
        // The very first stamp is gone.
        assert!(backups
            .iter()
            .all(|p| !p.ends_with("backups/20260301_090000")));
    }

    #[test]
    fn test_restore_rejects_non_backup() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-a-backup");
        fs::create_dir_all(&bogus).unwrap();

        let err = restore_backup(dir.path(), &bogus).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }
}
