//! Hourly ingest and periodic rotation entry points
//!
//! An hourly backup:
//!
//! 1. rotates the hourly ring, leaving `hour-0` empty
//! 2. seeds `hour-0` as a hard-link copy of `hour-1` (or creates it empty)
//! 3. mirrors every source directory into `hour-0/<basename>`
//!
//! Step 3 only rewrites files that changed, so unchanged files keep sharing
//! inodes with `hour-1`.

use crate::error::Result;
use crate::hardlink::copy_with_hard_links;
use crate::path_safety::WorkspaceContext;
use crate::rotation::{RotationEngine, RotationOp};
use crate::store::SnapshotStore;
use crate::sync::{SyncMode, SyncRequest, SyncSummary, Syncer};
use crate::tier::Tier;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// What an hourly backup did
#[derive(Debug, Clone, Default)]
pub struct BackupReport {
    /// Rotation steps taken before ingest
    pub rotation: Vec<RotationOp>,
    /// Whether `hour-0` was seeded from `hour-1`
    pub seeded_from_previous: bool,
    /// Per-source sync results
    pub sync: SyncSummary,
}

/// Runs backups for one store
pub struct Backup<'a, S: Syncer> {
    store: &'a SnapshotStore,
    sources: &'a [PathBuf],
    workspace: &'a WorkspaceContext,
    syncer: S,
}

impl<'a, S: Syncer> Backup<'a, S> {
    /// Bind a store, its sources and a syncer
    pub fn new(
        store: &'a SnapshotStore,
        sources: &'a [PathBuf],
        workspace: &'a WorkspaceContext,
        syncer: S,
    ) -> Self {
        Self {
            store,
            sources,
            workspace,
            syncer,
        }
    }

    fn engine(&self) -> RotationEngine {
        self.store.engine(self.workspace.clone())
    }

    /// Rotate the hourly ring and ingest the sources into a fresh `hour-0`
    pub fn hourly(&self, dry_run: bool) -> Result<BackupReport> {
        let mut report = BackupReport {
            rotation: self.engine().rotate_hourly(dry_run)?,
            ..Default::default()
        };

        let hour0 = self.store.path_of("hour-0");
        let hour1 = self.store.path_of("hour-1");
        self.workspace.validate(&hour0, "backup target")?;

        if dry_run {
            info!("[dry-run] would seed {:?} from {:?}", hour0, hour1);
        } else if hour1.is_dir() {
            copy_with_hard_links(&hour1, &hour0)?;
            report.seeded_from_previous = true;
        } else {
            fs::create_dir_all(&hour0)?;
        }

        for source in self.sources {
            if !source.is_dir() {
                warn!("Source directory does not exist: {:?}", source);
                report.sync.record_skip(source);
                continue;
            }
            let Some(name) = source.file_name() else {
                warn!("Source {:?} has no directory name, skipping", source);
                report.sync.record_skip(source);
                continue;
            };
            if let Err(e) = self.workspace.validate(source, "backup source") {
                report.sync.record_failure(source, &e);
                continue;
            }

            let target = hour0.join(name);
            if !dry_run {
                fs::create_dir_all(&target)?;
            }
            let request = SyncRequest::new(source, &target, SyncMode::Mirror, dry_run);
            match self.syncer.sync(&request) {
                Ok(()) => report.sync.record_success(source),
                Err(e) => report.sync.record_failure(source, &e),
            }
        }

        info!(
            "Hourly backup to {:?}: {} synced, {} failed, {} skipped",
            hour0,
            report.sync.succeeded.len(),
            report.sync.failed.len(),
            report.sync.skipped.len()
        );
        Ok(report)
    }

    /// Promote the oldest hour into the daily ring
    pub fn daily(&self, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.engine().rotate(Tier::Day, dry_run)
    }

    /// Rotate weeks and seed `week-0` from the oldest day
    pub fn weekly(&self, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.engine().rotate(Tier::Week, dry_run)
    }

    /// Promote the oldest week into the monthly ring
    pub fn monthly(&self, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.engine().rotate(Tier::Month, dry_run)
    }
}
