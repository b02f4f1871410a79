//! Restore, undelete, tag and prune operations
//!
//! [`RecoveryOps`] works on snapshot slots and tags through a
//! [`SnapshotStore`]. File copies back into the live source directories go
//! through a [`Syncer`]; everything that creates or removes paths is checked
//! against the [`WorkspaceContext`].
//!
//! Multi-source operations never stop at the first failing source. Each
//! source is attempted and the outcome is collected in a [`SyncSummary`].

use crate::error::{Result, SnapbackError};
use crate::hardlink::{copy_with_hard_links, LinkStats};
use crate::path_safety::{absolutize, expand_tilde, normalize_lexically, safe_remove, WorkspaceContext};
use crate::store::SnapshotStore;
use crate::sync::{SyncMode, SyncRequest, SyncSummary, Syncer};
use crate::tier::is_standard_name;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Result of [`RecoveryOps::delete_path`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The mirrored path was removed from `hour-0`
    Deleted(PathBuf),
    /// Dry run: the mirrored path would have been removed
    WouldDelete(PathBuf),
    /// The path belongs to a source but has no copy in `hour-0`
    NotInSnapshot(PathBuf),
    /// The path is not below any configured source directory
    NotInSource,
}

/// Recovery and maintenance operations over one snapshot store
pub struct RecoveryOps<'a, S: Syncer> {
    store: &'a SnapshotStore,
    sources: &'a [PathBuf],
    workspace: &'a WorkspaceContext,
    syncer: S,
}

impl<'a, S: Syncer> RecoveryOps<'a, S> {
    /// Bind the operations to a store, its source directories and a syncer
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

    /// Overwrite every source with its copy in `snapshot`
    ///
    /// Files not present in the snapshot are deleted from the source.
    pub fn recover(&self, snapshot: &str, dry_run: bool) -> Result<SyncSummary> {
        self.restore(snapshot, SyncMode::Mirror, dry_run)
    }

    /// Restore only files missing from the sources; existing files are untouched
    pub fn undelete(&self, snapshot: &str, dry_run: bool) -> Result<SyncSummary> {
        self.restore(snapshot, SyncMode::SkipExisting, dry_run)
    }

    fn restore(&self, snapshot: &str, mode: SyncMode, dry_run: bool) -> Result<SyncSummary> {
        ensure_plain_name(snapshot)?;
        if !self.store.exists(snapshot) {
            return Err(SnapbackError::SnapshotNotFound(snapshot.to_string()));
        }
        let snapshot_path = self.store.path_of(snapshot);
        let mut summary = SyncSummary::default();

        for source in self.sources {
            let Some(name) = source.file_name() else {
                warn!("Source {:?} has no directory name, skipping", source);
                summary.record_skip(source);
                continue;
            };
            let subdir = snapshot_path.join(name);
            if !subdir.is_dir() {
                warn!("Snapshot subdirectory not found: {:?}", subdir);
                summary.record_skip(source);
                continue;
            }

            self.workspace.validate(source, "recover destination")?;
            if !dry_run {
                if let Some(parent) = source.parent() {
                    fs::create_dir_all(parent)?;
                }
            }

            let request = SyncRequest::new(&subdir, source, mode, dry_run);
            match self.syncer.sync(&request) {
                Ok(()) => {
                    info!("Restored {:?} from {} ({:?})", source, snapshot, mode);
                    summary.record_success(source);
                }
                Err(e) => summary.record_failure(source, &e),
            }
        }
        Ok(summary)
    }

    /// Preserve `snapshot` under the name `tag` as a hard-link copy
    ///
    /// Tags are never rotated. The tag name must be a single path component
    /// that is not a standard slot name.
    pub fn tag(&self, snapshot: &str, tag: &str, dry_run: bool) -> Result<LinkStats> {
        ensure_plain_name(snapshot)?;
        if !self.store.exists(snapshot) {
            return Err(SnapbackError::SnapshotNotFound(snapshot.to_string()));
        }
        ensure_tag_name(tag)?;

        let tag_path = self.store.path_of(tag);
        if fs::symlink_metadata(&tag_path).is_ok() {
            return Err(SnapbackError::TagExists(tag.to_string()));
        }
        self.workspace.validate(&tag_path, "tag destination")?;

        if dry_run {
            info!("[dry-run] would tag {} as {}", snapshot, tag);
            return Ok(LinkStats::default());
        }
        let stats = copy_with_hard_links(&self.store.path_of(snapshot), &tag_path)?;
        info!("Created tag '{}' from {}", tag, snapshot);
        Ok(stats)
    }

    /// Remove the copy of a live `path` from `hour-0`
    ///
    /// Relative paths are taken relative to the current directory. The path
    /// must lie in exactly one configured source.
    pub fn delete_path(&self, path: &Path, dry_run: bool) -> Result<DeleteOutcome> {
        let hour0 = self.store.path_of("hour-0");
        if !hour0.is_dir() {
            return Err(SnapbackError::SnapshotNotFound("hour-0".to_string()));
        }

        let target = normalize_lexically(&absolutize(&expand_tilde(path)));
        let matches: Vec<(&PathBuf, PathBuf)> = self
            .sources
            .iter()
            .filter_map(|source| {
                let source_abs = normalize_lexically(&absolutize(source));
                target
                    .strip_prefix(&source_abs)
                    .ok()
                    .map(|rel| (source, rel.to_path_buf()))
            })
            .collect();

        let (source, relative) = match matches.as_slice() {
            [] => {
                warn!("{:?} is not inside any backed-up directory", path);
                return Ok(DeleteOutcome::NotInSource);
            }
            [single] => single.clone(),
            several => {
                let names: Vec<_> = several.iter().map(|(s, _)| s.display().to_string()).collect();
                return Err(SnapbackError::invalid(format!(
                    "{} is inside several backed-up directories ({}); refusing to guess",
                    path.display(),
                    names.join(", ")
                )));
            }
        };

        let name = source
            .file_name()
            .ok_or_else(|| SnapbackError::invalid(format!("source {:?} has no directory name", source)))?;
        let mirrored = hour0.join(name).join(&relative);

        if fs::symlink_metadata(&mirrored).is_err() {
            warn!("Path not found in hour-0: {:?}", mirrored);
            return Ok(DeleteOutcome::NotInSnapshot(mirrored));
        }

        if dry_run {
            self.workspace.validate(&mirrored, "delete from snapshot")?;
            info!("[dry-run] would delete {:?}", mirrored);
            return Ok(DeleteOutcome::WouldDelete(mirrored));
        }
        safe_remove(&mirrored, self.workspace, "delete from snapshot")?;
        info!("Deleted from hour-0: {:?}", mirrored);
        Ok(DeleteOutcome::Deleted(mirrored))
    }

    /// Tag names, sorted
    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.store.list_tags()
    }

    /// Remove a tag
    ///
    /// Standard slot names are refused; rotation owns those.
    pub fn delete_tag(&self, tag: &str, dry_run: bool) -> Result<()> {
        ensure_tag_name(tag)?;
        if !self.store.exists(tag) {
            return Err(SnapbackError::TagNotFound(tag.to_string()));
        }
        let tag_path = self.store.path_of(tag);

        if dry_run {
            self.workspace.validate(&tag_path, "delete tag")?;
            info!("[dry-run] would delete tag {}", tag);
            return Ok(());
        }
        safe_remove(&tag_path, self.workspace, "delete tag")?;
        info!("Deleted tag: {}", tag);
        Ok(())
    }
}

/// A snapshot or tag name must be exactly one normal path component
fn ensure_plain_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(SnapbackError::invalid(format!(
            "{:?} is not a valid snapshot name",
            name
        ))),
    }
}

fn ensure_tag_name(tag: &str) -> Result<()> {
    if is_standard_name(tag) {
        return Err(SnapbackError::StandardSnapshotName(tag.to_string()));
    }
    ensure_plain_name(tag)
}
