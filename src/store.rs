//! Snapshot base directory layout
//!
//! [`SnapshotStore`] owns `<base>/` and answers questions about what it
//! contains. It performs no rotation itself; [`SnapshotStore::engine`] hands
//! out a [`RotationEngine`] bound to the same base and retention.

use crate::error::Result;
use crate::path_safety::WorkspaceContext;
use crate::rotation::RotationEngine;
use crate::tier::{self, is_standard_name, Retention, TAG_AGE};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A snapshot or tag directory with its age
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    /// Directory name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Approximate age in hours; `None` for tags
    pub hours_ago: Option<u64>,
    /// Whether this is a tag rather than a rotated slot
    pub is_tag: bool,
    /// Last modification time of the directory
    pub modified: Option<DateTime<Local>>,
}

/// The snapshot base directory and its retention policy
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    base: PathBuf,
    retention: Retention,
}

impl SnapshotStore {
    /// Create a store rooted at `base`; nothing is touched on disk
    pub fn new(base: impl Into<PathBuf>, retention: Retention) -> Self {
        Self {
            base: base.into(),
            retention,
        }
    }

    /// Snapshot base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Retention counts per tier
    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Create the base and every slot of every tier
    ///
    /// Safe to call repeatedly; existing slots are left untouched.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base)?;
        let mut created = 0usize;
        for slot in self.retention.all_slots() {
            let path = self.base.join(slot.to_string());
            if !path.is_dir() {
                fs::create_dir_all(&path)?;
                created += 1;
            }
        }
        info!("Initialized snapshot base {:?} ({} slots created)", self.base, created);
        Ok(())
    }

    /// Whether `<base>/<name>` is an existing directory
    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_dir()
    }

    /// `<base>/<name>`
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    /// Standard slot directories, sorted by name
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .directory_names()?
            .into_iter()
            .filter(|name| is_standard_name(name))
            .collect())
    }

    /// Tag directories, sorted by name
    pub fn list_tags(&self) -> Result<Vec<String>> {
        Ok(self
            .directory_names()?
            .into_iter()
            .filter(|name| !is_standard_name(name))
            .collect())
    }

    /// Every snapshot and tag, newest first with tags last
    pub fn snapshots_by_age(&self) -> Result<Vec<SnapshotInfo>> {
        let mut names = self.list()?;
        names.extend(self.list_tags()?);
        tier::sort_by_age(&mut names);

        names
            .into_iter()
            .map(|name| {
                let path = self.path_of(&name);
                let modified = fs::metadata(&path)?.modified().ok().map(DateTime::<Local>::from);
                let hours = tier::hours_ago(&name);
                Ok(SnapshotInfo {
                    is_tag: hours == TAG_AGE,
                    hours_ago: (hours != TAG_AGE).then_some(hours),
                    name,
                    path,
                    modified,
                })
            })
            .collect()
    }

    /// A rotation engine over this store
    pub fn engine(&self, workspace: WorkspaceContext) -> RotationEngine {
        RotationEngine::new(&self.base, self.retention, workspace)
    }

    fn directory_names(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Snapshot base {:?} does not exist yet", self.base);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
