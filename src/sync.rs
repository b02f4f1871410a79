//! File synchronization collaborator
//!
//! Ingest and recovery copy directory contents with an external tool. The
//! [`Syncer`] trait is the seam: production code uses [`Rsync`], tests plug
//! in a recording fake.

use crate::error::{Result, SnapbackError};
use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// How existing files in the destination are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Make the destination an exact copy, deleting extraneous files
    Mirror,
    /// Only create files missing from the destination
    SkipExisting,
    /// Copy new and changed files, keep extraneous ones
    Update,
}

/// One directory synchronization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Directory whose contents are copied
    pub source: PathBuf,
    /// Directory receiving the contents
    pub destination: PathBuf,
    /// Destination handling
    pub mode: SyncMode,
    /// Report only
    pub dry_run: bool,
}

impl SyncRequest {
    /// Build a request
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, mode: SyncMode, dry_run: bool) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode,
            dry_run,
        }
    }
}

/// Copies the contents of one directory into another
pub trait Syncer {
    /// Perform `request`, returning once the copy has finished
    fn sync(&self, request: &SyncRequest) -> Result<()>;
}

impl<S: Syncer + ?Sized> Syncer for &S {
    fn sync(&self, request: &SyncRequest) -> Result<()> {
        (**self).sync(request)
    }
}

impl<S: Syncer + ?Sized> Syncer for Box<S> {
    fn sync(&self, request: &SyncRequest) -> Result<()> {
        (**self).sync(request)
    }
}

/// [`Syncer`] backed by the `rsync` executable
#[derive(Debug, Clone)]
pub struct Rsync {
    program: OsString,
    extra_params: Vec<String>,
    local_filters: bool,
}

impl Default for Rsync {
    fn default() -> Self {
        Self::new()
    }
}

impl Rsync {
    /// `rsync` from `PATH`, no extra parameters
    pub fn new() -> Self {
        Self {
            program: OsString::from("rsync"),
            extra_params: Vec::new(),
            local_filters: false,
        }
    }

    /// Use a different executable
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Append parameters (`RSYNC_PARAMS`) to every invocation
    pub fn with_params(mut self, params: impl IntoIterator<Item = String>) -> Self {
        self.extra_params.extend(params);
        self
    }

    /// Honor `.gitignore` and skip `.git` / `.snapshots` (project-local mode)
    pub fn with_local_filters(mut self, enabled: bool) -> Self {
        self.local_filters = enabled;
        self
    }

    /// Arguments passed to the executable for `request`
    pub fn args(&self, request: &SyncRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-a".into()];
        match request.mode {
            SyncMode::Mirror => args.push("--delete".into()),
            SyncMode::SkipExisting => args.push("--ignore-existing".into()),
            SyncMode::Update => {}
        }
        if self.local_filters {
            args.push("--filter=:- .gitignore".into());
            args.push("--exclude=.git".into());
            args.push("--exclude=.snapshots".into());
        }
        args.extend(self.extra_params.iter().map(OsString::from));
        args.push(with_trailing_slash(&request.source));
        args.push(request.destination.clone().into_os_string());
        args
    }
}

/// `dir/` so rsync copies the contents rather than the directory itself
fn with_trailing_slash(path: &Path) -> OsString {
    let mut s = path.as_os_str().to_os_string();
    if !s.to_string_lossy().ends_with('/') {
        s.push("/");
    }
    s
}

impl Syncer for Rsync {
    fn sync(&self, request: &SyncRequest) -> Result<()> {
        let args = self.args(request);
        let rendered = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let program = self.program.to_string_lossy().into_owned();

        if request.dry_run {
            info!("[dry-run] would run: {} {}", program, rendered);
            return Ok(());
        }
        debug!("Running: {} {}", program, rendered);

        let output = match Command::new(&self.program).args(&args).output() {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SnapbackError::ToolNotFound(program))
            }
            Err(e) => return Err(e.into()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{} output:\n{}", program, stdout.trim_end());
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SnapbackError::SyncFailed {
                source_dir: request.source.clone(),
                destination: request.destination.clone(),
                status: format!("{} {}", output.status, stderr.trim()).trim_end().to_string(),
            });
        }
        Ok(())
    }
}

/// Per-source outcome of a multi-source sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Sources synced successfully
    pub succeeded: Vec<PathBuf>,
    /// Sources that failed, with the error message
    pub failed: Vec<(PathBuf, String)>,
    /// Sources skipped (missing snapshot subdirectory or source)
    pub skipped: Vec<PathBuf>,
}

impl SyncSummary {
    /// Record a success
    pub fn record_success(&mut self, source: impl Into<PathBuf>) {
        self.succeeded.push(source.into());
    }

    /// Record a failure and log it
    pub fn record_failure(&mut self, source: impl Into<PathBuf>, error: &SnapbackError) {
        let source = source.into();
        warn!("Sync failed for {:?}: {}", source, error);
        self.failed.push((source, error.to_string()));
    }

    /// Record a skipped source
    pub fn record_skip(&mut self, source: impl Into<PathBuf>) {
        self.skipped.push(source.into());
    }

    /// Sources that were actually attempted
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether nothing failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether at least one source was attempted and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.failed.is_empty() && self.succeeded.is_empty()
    }
}
