//! Compare a live file with an older snapshot version
//!
//! The snapshot copy is located by file name through [`history`], so
//! `periods_ago = 1` means "the second newest copy", which is usually
//! `hour-1`.

use crate::diff::{create_file_diff, DiffOptions, FileDiff};
use crate::error::{Result, SnapbackError};
use crate::history::{self, FileVersion};
use crate::path_safety::{absolutize, expand_tilde};
use crate::store::SnapshotStore;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Default external tool
pub const DEFAULT_TOOL: &str = "vimdiff";

/// File comparisons against one snapshot store
pub struct Comparer<'a> {
    store: &'a SnapshotStore,
    sources: &'a [PathBuf],
}

impl<'a> Comparer<'a> {
    /// Compare files of `sources` against copies in `store`
    pub fn new(store: &'a SnapshotStore, sources: &'a [PathBuf]) -> Self {
        Self { store, sources }
    }

    /// Find the live file and its copy `periods_ago` versions back
    ///
    /// # Errors
    ///
    /// - [`SnapbackError::PathNotFound`] if `current` does not exist
    /// - [`SnapbackError::VersionNotFound`] if there are not enough copies
    pub fn locate(&self, current: &Path, periods_ago: usize) -> Result<(PathBuf, FileVersion)> {
        let current = absolutize(&expand_tilde(current));
        if !current.is_file() {
            return Err(SnapbackError::PathNotFound(current));
        }
        let name = current
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SnapbackError::invalid(format!("{} has no file name", current.display())))?;

        let version = history::file_from_snapshot(self.store, self.sources, &name, periods_ago)?
            .ok_or(SnapbackError::VersionNotFound {
                file: name,
                periods_ago,
            })?;
        debug!("Comparing {:?} with {:?} ({})", current, version.path, version.snapshot);
        Ok((current, version))
    }

    /// Unified line diff from the snapshot copy to the live file
    pub fn text_diff(&self, current: &Path, periods_ago: usize, options: &DiffOptions) -> Result<FileDiff> {
        let (current, version) = self.locate(current, periods_ago)?;

        for path in [&current, &version.path] {
            let size = fs::metadata(path)?.len();
            if size > options.max_file_size {
                return Err(SnapbackError::invalid(format!(
                    "{} is too large for an in-process diff ({} bytes); use --tool instead",
                    path.display(),
                    size
                )));
            }
        }

        let old = fs::read(&version.path)?;
        let new = fs::read(&current)?;
        Ok(create_file_diff(
            version.path.display().to_string(),
            current.display().to_string(),
            &old,
            &new,
            options,
        ))
    }

    /// Open the live file and the snapshot copy in an external tool
    ///
    /// Exit status 1 is accepted since diff-style tools use it for "differs".
    pub fn launch_tool(&self, tool: &str, current: &Path, periods_ago: usize) -> Result<FileVersion> {
        let (current, version) = self.locate(current, periods_ago)?;
        info!("Comparing {:?} with {:?}", current, version.path);

        let status = match Command::new(tool).arg(&current).arg(&version.path).status() {
            Ok(status) => status,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapbackError::ToolNotFound(tool.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        match status.code() {
            Some(0) | Some(1) => Ok(version),
            _ => Err(SnapbackError::ToolFailed {
                tool: tool.to_string(),
                message: status.to_string(),
            }),
        }
    }
}
