//! Integration tests for snapback
//!
//! Drives backup, rotation and recovery end to end against real
//! directories. Syncing goes through [`LocalCopy`] so rsync is not needed.

use ::snapback::compare::Comparer;
use ::snapback::diff::DiffOptions;
use ::snapback::history;
use ::snapback::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Plain-copy stand-in for rsync
pub struct LocalCopy;

impl Syncer for LocalCopy {
    fn sync(&self, request: &SyncRequest) -> Result<()> {
        if request.dry_run {
            return Ok(());
        }
        match request.mode {
            SyncMode::Mirror => {
                if request.destination.exists() {
                    fs::remove_dir_all(&request.destination)?;
                }
                copy_tree(&request.source, &request.destination, true)
            }
            SyncMode::SkipExisting => copy_tree(&request.source, &request.destination, false),
            SyncMode::Update => copy_tree(&request.source, &request.destination, true),
        }
    }
}

fn copy_tree(src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &to, overwrite)?;
        } else if overwrite || !to.exists() {
            fs::copy(entry.path(), &to)?;
        }
    }
    Ok(())
}

/// Fails for sources whose name matches
pub struct FailFor(pub &'static str);

impl Syncer for FailFor {
    fn sync(&self, request: &SyncRequest) -> Result<()> {
        if request.source.ends_with(self.0) {
            return Err(SnapbackError::SyncFailed {
                source_dir: request.source.clone(),
                destination: request.destination.clone(),
                status: "exit status: 23".into(),
            });
        }
        LocalCopy.sync(request)
    }
}

/// Test harness: two source directories and a store in one workspace
pub struct SnapbackHarness {
    pub temp_dir: TempDir,
    pub sources: Vec<PathBuf>,
    pub store: SnapshotStore,
    pub workspace: WorkspaceContext,
}

impl SnapbackHarness {
    /// Small rings so every tier boundary is reached quickly
    pub fn small_retention() -> Retention {
        Retention {
            hourly: 3,
            daily: 2,
            weekly: 2,
            monthly: 2,
        }
    }

    pub fn new() -> Self {
        Self::with_retention(Self::small_retention())
    }

    pub fn with_retention(retention: Retention) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let sources = vec![temp_dir.path().join("proj"), temp_dir.path().join("notes")];
        for source in &sources {
            fs::create_dir_all(source).unwrap();
        }
        let store = SnapshotStore::new(temp_dir.path().join(".snapshots"), retention);
        store.init().unwrap();
        let workspace = WorkspaceContext::local(temp_dir.path());

        Self {
            temp_dir,
            sources,
            store,
            workspace,
        }
    }

    pub fn write(&self, rel: &str, contents: &str) {
        self.try_write(rel, contents).unwrap();
    }

    pub fn try_write(&self, rel: &str, contents: &str) -> anyhow::Result<()> {
        let path = self.temp_dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn live(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    /// Contents of `<slot>/<rel>`, if present
    pub fn snapshot_file(&self, slot: &str, rel: &str) -> Option<String> {
        fs::read_to_string(self.store.path_of(slot).join(rel)).ok()
    }

    pub fn backup(&self) -> Backup<'_, LocalCopy> {
        Backup::new(&self.store, &self.sources, &self.workspace, LocalCopy)
    }

    pub fn recovery(&self) -> RecoveryOps<'_, LocalCopy> {
        RecoveryOps::new(&self.store, &self.sources, &self.workspace, LocalCopy)
    }

    pub fn hourly(&self) -> BackupReport {
        let report = self.backup().hourly(false).unwrap();
        assert!(report.sync.is_clean(), "sync failures: {:?}", report.sync.failed);
        report
    }

    pub fn rotate(&self, tier: Tier) -> Vec<RotationOp> {
        self.store.engine(self.workspace.clone()).rotate(tier, false).unwrap()
    }
}

#[test]
fn test_hourly_builds_history() {
    let h = SnapbackHarness::new();

    for v in 1..=4 {
        h.write("proj/a.txt", &format!("v{}", v));
        h.hourly();
    }

    for (slot, expected) in [("hour-0", "v4"), ("hour-1", "v3"), ("hour-2", "v2"), ("hour-3", "v1")] {
        assert_eq!(h.snapshot_file(slot, "proj/a.txt").as_deref(), Some(expected), "{}", slot);
    }

    // The oldest hour falls off the ring
    h.write("proj/a.txt", "v5");
    h.hourly();
    assert_eq!(h.snapshot_file("hour-3", "proj/a.txt").as_deref(), Some("v2"));
    assert!(!h.store.path_of("hour-4").exists());
}

#[cfg(unix)]
#[test]
fn test_unchanged_files_share_inodes_across_hours() {
    use std::os::unix::fs::MetadataExt;

    let h = SnapbackHarness::new();
    h.write("notes/stable.txt", "same");
    h.write("proj/a.txt", "v1");
    h.hourly();

    // Seeding hour-0 links every file of hour-1 before the sync runs
    h.store.engine(h.workspace.clone()).rotate_hourly(false).unwrap();
    copy_with_hard_links(&h.store.path_of("hour-1"), &h.store.path_of("hour-0")).unwrap();

    let a = fs::metadata(h.store.path_of("hour-0/notes/stable.txt")).unwrap();
    let b = fs::metadata(h.store.path_of("hour-1/notes/stable.txt")).unwrap();
    assert_eq!(a.ino(), b.ino());
    assert!(a.nlink() >= 2);
}

#[test]
fn test_daily_promotes_oldest_hour() {
    let h = SnapbackHarness::new();
    for v in 1..=4 {
        h.write("proj/a.txt", &format!("v{}", v));
        h.hourly();
    }

    let ops = h.rotate(Tier::Day);
    assert!(ops.iter().any(|op| matches!(op, RotationOp::Rename { .. })));
    assert_eq!(h.snapshot_file("day-0", "proj/a.txt").as_deref(), Some("v1"));
    assert!(!h.store.path_of("hour-3").exists());

    h.write("proj/a.txt", "v5");
    h.hourly();
    h.rotate(Tier::Day);
    assert_eq!(h.snapshot_file("day-0", "proj/a.txt").as_deref(), Some("v2"));
    assert_eq!(h.snapshot_file("day-1", "proj/a.txt").as_deref(), Some("v1"));
}

#[test]
fn test_weekly_copies_oldest_day() {
    let h = SnapbackHarness::new();
    h.write(".snapshots/day-2/proj/a.txt", "old day");

    let ops = h.rotate(Tier::Week);

    assert!(ops.iter().any(|op| matches!(op, RotationOp::HardLinkCopy { .. })));
    assert_eq!(h.snapshot_file("week-0", "proj/a.txt").as_deref(), Some("old day"));
    assert_eq!(h.snapshot_file("day-2", "proj/a.txt").as_deref(), Some("old day"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let week = fs::metadata(h.store.path_of("week-0/proj/a.txt")).unwrap().ino();
        let day = fs::metadata(h.store.path_of("day-2/proj/a.txt")).unwrap().ino();
        assert_eq!(week, day);
    }
}

#[test]
fn test_monthly_promotes_oldest_week() {
    let h = SnapbackHarness::new();
    h.write(".snapshots/week-2/proj/a.txt", "old week");

    h.rotate(Tier::Month);

    assert_eq!(h.snapshot_file("month-0", "proj/a.txt").as_deref(), Some("old week"));
    assert!(!h.store.path_of("week-2").exists());
}

#[test]
fn test_long_schedule_keeps_slots_in_range() {
    let h = SnapbackHarness::new();
    let retention = h.store.retention();

    for hour in 1..=30 {
        h.write("proj/a.txt", &format!("hour {}", hour));
        h.hourly();
        if hour % 4 == 0 {
            h.rotate(Tier::Day);
        }
        if hour % 8 == 0 {
            h.rotate(Tier::Week);
        }
        if hour % 16 == 0 {
            h.rotate(Tier::Month);
        }
    }

    for name in h.store.list().unwrap() {
        let slot = SnapshotName::parse(&name).unwrap();
        assert!(slot.index <= retention.count(slot.tier), "{} out of range", name);
    }
    assert!(h.store.list_tags().unwrap().is_empty());
    assert_eq!(h.snapshot_file("hour-0", "proj/a.txt").as_deref(), Some("hour 30"));
}

#[test]
fn test_recover_mirrors_snapshot() {
    let h = SnapbackHarness::new();
    h.write("proj/a.txt", "v1");
    h.write("proj/b.txt", "b");
    h.hourly();

    h.write("proj/a.txt", "v2");
    fs::remove_file(h.live("proj/b.txt")).unwrap();
    h.write("proj/c.txt", "new");

    let summary = h.recovery().recover("hour-0", false).unwrap();

    assert_eq!(summary.succeeded.len(), 2);
    assert_eq!(fs::read_to_string(h.live("proj/a.txt")).unwrap(), "v1");
    assert_eq!(fs::read_to_string(h.live("proj/b.txt")).unwrap(), "b");
    assert!(!h.live("proj/c.txt").exists());
}

#[test]
fn test_undelete_only_restores_missing_files() {
    let h = SnapbackHarness::new();
    h.write("proj/a.txt", "v1");
    h.write("proj/b.txt", "b");
    h.hourly();

    h.write("proj/a.txt", "v2");
    fs::remove_file(h.live("proj/b.txt")).unwrap();
    h.write("proj/c.txt", "new");

    h.recovery().undelete("hour-0", false).unwrap();

    assert_eq!(fs::read_to_string(h.live("proj/a.txt")).unwrap(), "v2");
    assert_eq!(fs::read_to_string(h.live("proj/b.txt")).unwrap(), "b");
    assert_eq!(fs::read_to_string(h.live("proj/c.txt")).unwrap(), "new");
}

#[test]
fn test_recover_skips_sources_missing_from_snapshot() {
    let h = SnapbackHarness::new();
    h.write("proj/a.txt", "v1");
    h.hourly();
    fs::remove_dir_all(h.store.path_of("hour-0/notes")).unwrap();

    let summary = h.recovery().recover("hour-0", false).unwrap();

    assert_eq!(summary.succeeded, vec![h.sources[0].clone()]);
    assert_eq!(summary.skipped, vec![h.sources[1].clone()]);
    assert!(summary.is_clean());
}

#[test]
fn test_partial_sync_failure_is_aggregated() {
    let h = SnapbackHarness::new();
    h.write("proj/a.txt", "v1");
    h.write("notes/n.txt", "n");

    let report = Backup::new(&h.store, &h.sources, &h.workspace, FailFor("notes"))
        .hourly(false)
        .unwrap();

    assert_eq!(report.sync.succeeded, vec![h.sources[0].clone()]);
    assert_eq!(report.sync.failed.len(), 1);
    assert!(!report.sync.all_failed());
    assert_eq!(h.snapshot_file("hour-0", "proj/a.txt").as_deref(), Some("v1"));
}

#[test]
fn test_tag_survives_rotation() {
    let h = SnapbackHarness::new();
    h.write("proj/a.txt", "release");
    h.hourly();
    h.recovery().tag("hour-0", "release-1", false).unwrap();

    for v in 0..10 {
        h.write("proj/a.txt", &format!("later {}", v));
        h.hourly();
        if v % 3 == 0 {
            h.rotate(Tier::Day);
        }
    }

    assert_eq!(h.snapshot_file("release-1", "proj/a.txt").as_deref(), Some("release"));
    let all = h.store.snapshots_by_age().unwrap();
    let last = all.last().unwrap();
    assert_eq!(last.name, "release-1");
    assert!(last.is_tag);

    h.recovery().delete_tag("release-1", false).unwrap();
    assert!(!h.store.exists("release-1"));
}

#[test]
fn test_delete_path_prunes_hour0_only() {
    let h = SnapbackHarness::new();
    h.write("proj/secret/key.pem", "private");
    h.write("proj/a.txt", "v1");
    h.hourly();

    let outcome = h.recovery().delete_path(&h.live("proj/secret"), false).unwrap();

    assert_eq!(outcome, DeleteOutcome::Deleted(h.store.path_of("hour-0/proj/secret")));
    assert!(!h.store.path_of("hour-0/proj/secret").exists());
    assert!(h.live("proj/secret/key.pem").exists());
    assert_eq!(h.snapshot_file("hour-0", "proj/a.txt").as_deref(), Some("v1"));
}

#[test]
fn test_history_and_text_diff() {
    let h = SnapbackHarness::new();
    for v in 1..=3 {
        h.write("proj/notes.txt", &format!("header\nversion {}\nfooter\n", v));
        h.hourly();
    }
    h.write("proj/notes.txt", "header\nversion 4\nfooter\n");

    let versions = history::find_file(&h.store, &h.sources, "notes.txt").unwrap();
    let names: Vec<_> = versions.iter().map(|v| v.snapshot.as_str()).collect();
    assert_eq!(names, vec!["hour-0", "hour-1", "hour-2"]);

    let diff = Comparer::new(&h.store, &h.sources)
        .text_diff(&h.live("proj/notes.txt"), 2, &DiffOptions::default())
        .unwrap();
    assert_eq!(diff.lines_added, 1);
    assert_eq!(diff.lines_deleted, 1);
    let rendered = diff.to_string();
    assert!(rendered.contains("-version 1\n"));
    assert!(rendered.contains("+version 4\n"));
}

#[test]
fn test_local_config_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("proj")).unwrap();
    fs::write(temp_dir.path().join("proj/a.txt"), "v1").unwrap();
    let rc = temp_dir.path().join(".snapshotrc");
    fs::write(&rc, "DIRS='proj'\nhsnaps=2\n").unwrap();

    let config = Config::from_file(&rc).unwrap();
    let root = fs::canonicalize(temp_dir.path()).unwrap();
    assert!(config.is_local());
    assert_eq!(config.dirs, vec![root.join("proj")]);
    assert_eq!(config.target_base, root.join(".snapshots"));

    let store = config.store();
    store.init().unwrap();
    let workspace = config.workspace();
    let report = Backup::new(&store, &config.dirs, &workspace, LocalCopy)
        .hourly(false)
        .unwrap();
    assert!(report.sync.is_clean());
    assert_eq!(fs::read_to_string(root.join(".snapshots/hour-0/proj/a.txt")).unwrap(), "v1");

    fs::write(&rc, "DIRS='proj'\nTARGETBASE='../elsewhere'\n").unwrap();
    let err = Config::from_file(&rc).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_rotation_outside_workspace_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let inner = temp_dir.path().join("inner");
    fs::create_dir_all(&inner).unwrap();
    let store = SnapshotStore::new(temp_dir.path().join("outside"), SnapbackHarness::small_retention());
    store.init().unwrap();

    let err = store
        .engine(WorkspaceContext::local(&inner))
        .rotate_hourly(false)
        .unwrap_err();

    assert!(err.is_validation());
    assert!(store.path_of("hour-3").is_dir());
}
