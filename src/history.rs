//! File history across snapshots
//!
//! Every snapshot (and tag) holds one subdirectory per source directory.
//! [`find_file`] searches those subdirectories for a file name and returns
//! the hits newest first; [`file_from_snapshot`] picks the N-th of them.

use crate::error::Result;
use crate::store::SnapshotStore;
use crate::tier::{SnapshotName, Tier};
use crate::utils::format_size;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// One copy of a file inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVersion {
    /// Snapshot or tag name
    pub snapshot: String,
    /// Location of the copy
    pub path: PathBuf,
    /// Size in bytes, if the file could be stat'ed
    pub size: Option<u64>,
}

/// Every copy of a file named `filename` below the source subdirectories,
/// newest snapshot first and tags last
pub fn find_file(store: &SnapshotStore, sources: &[PathBuf], filename: &str) -> Result<Vec<FileVersion>> {
    let mut versions = Vec::new();

    for snapshot in store.snapshots_by_age()? {
        for source in sources {
            let Some(name) = source.file_name() else {
                continue;
            };
            let subdir = snapshot.path.join(name);
            if !subdir.is_dir() {
                continue;
            }

            let walker = WalkDir::new(&subdir).follow_links(false).sort_by_file_name();
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!("Skipping unreadable entry in {:?}: {}", subdir, e);
                        continue;
                    }
                };
                if entry.file_type().is_file() && entry.file_name() == filename {
                    trace!("Found {:?} in {}", entry.path(), snapshot.name);
                    versions.push(FileVersion {
                        snapshot: snapshot.name.clone(),
                        size: fs::metadata(entry.path()).ok().map(|m| m.len()),
                        path: entry.into_path(),
                    });
                }
            }
        }
    }
    Ok(versions)
}

/// The copy `periods_ago` versions back (0 is the newest copy)
pub fn file_from_snapshot(
    store: &SnapshotStore,
    sources: &[PathBuf],
    filename: &str,
    periods_ago: usize,
) -> Result<Option<FileVersion>> {
    Ok(find_file(store, sources, filename)?.into_iter().nth(periods_ago))
}

/// Human readable age of a snapshot name; tags are returned unchanged
pub fn age_description(name: &str) -> String {
    let Some(slot) = SnapshotName::parse(name) else {
        return name.to_string();
    };
    let n = slot.index;
    match slot.tier {
        Tier::Hour => match n {
            0 => "current".to_string(),
            1 => "1 hour ago".to_string(),
            _ => format!("{} hours ago", n),
        },
        Tier::Day => match n {
            0 => "yesterday (end of day)".to_string(),
            _ => format!("{} days ago", n + 1),
        },
        Tier::Week => match n {
            0 => "last week".to_string(),
            _ => format!("{} weeks ago", n + 1),
        },
        Tier::Month => match n {
            0 => "last month".to_string(),
            _ => format!("{} months ago", n + 1),
        },
    }
}

/// `snapshot | size | path` lines for display
pub fn format_listing(versions: &[FileVersion]) -> Vec<String> {
    versions
        .iter()
        .map(|v| {
            let size = v.size.map(format_size).unwrap_or_else(|| "?".to_string());
            format!("{:15} | {:>10} | {}", v.snapshot, size, v.path.display())
        })
        .collect()
}
