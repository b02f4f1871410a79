//! Hard-link tree duplication
//!
//! [`copy_with_hard_links`] behaves like `cp -al src dst` followed by a
//! prune: every regular file in `dst` becomes a hard link to the matching file
//! in `src`, so an unchanged tree costs only directory entries. When a link
//! cannot be created (cross-device, unsupported filesystem) the file is copied
//! byte for byte instead and a warning is logged.
//!
//! Symlinks are recreated with the same target and never traversed.

use crate::error::{Result, SnapbackError};
use filetime::FileTime;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Counters describing what a [`copy_with_hard_links`] call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Directories created or kept
    pub dirs: usize,
    /// Regular files hard-linked
    pub linked: usize,
    /// Regular files byte-copied after a failed link
    pub copied: usize,
    /// Symlinks recreated
    pub symlinks: usize,
    /// Entries removed from `dst` because they are absent from `src`
    pub pruned: usize,
}

impl LinkStats {
    /// Number of regular files placed in the destination
    pub fn files(&self) -> usize {
        self.linked + self.copied
    }
}

/// Replicate `src` into `dst` using hard links for regular files
///
/// `dst` and any missing parents are created. Existing entries in `dst` are
/// replaced, and entries that have no counterpart in `src` are pruned so the
/// result mirrors `src` exactly.
///
/// # Errors
///
/// - [`SnapbackError::PathNotFound`] if `src` does not exist
/// - [`SnapbackError::InvalidArgument`] if `src` is not a directory
/// - [`SnapbackError::Io`] / [`SnapbackError::WalkDir`] for filesystem failures
///   other than a refused hard link
pub fn copy_with_hard_links(src: &Path, dst: &Path) -> Result<LinkStats> {
    let src_meta = match fs::symlink_metadata(src) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SnapbackError::PathNotFound(src.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !src_meta.is_dir() {
        return Err(SnapbackError::invalid(format!(
            "{} is not a directory",
            src.display()
        )));
    }

    fs::create_dir_all(dst)?;
    let mut stats = LinkStats::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    // Permissions are applied after the walk so read-only directories can be filled
    let mut directories: Vec<(PathBuf, fs::Metadata)> = vec![(dst.to_path_buf(), src_meta)];

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| SnapbackError::internal(format!("walk escaped source: {}", e)))?
            .to_path_buf();
        let target = dst.join(&relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            ensure_directory(&target)?;
            directories.push((target, entry.metadata()?));
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            remove_existing(&target)?;
            let link_target = fs::read_link(entry.path())?;
            create_symlink(&link_target, &target)?;
            stats.symlinks += 1;
        } else {
            remove_existing(&target)?;
            match fs::hard_link(entry.path(), &target) {
                Ok(()) => {
                    trace!("Linked {:?}", relative);
                    stats.linked += 1;
                }
                Err(e) => {
                    warn!(
                        "Hard link failed for {:?} ({}), copying instead",
                        entry.path(),
                        e
                    );
                    copy_preserving(entry.path(), &target)?;
                    stats.copied += 1;
                }
            }
        }
        seen.insert(relative);
    }

    stats.pruned = prune_extras(dst, &seen)?;

    for (dir, metadata) in directories.iter().rev() {
        fs::set_permissions(dir, metadata.permissions())?;
        if let Ok(modified) = metadata.modified() {
            filetime::set_file_mtime(dir, FileTime::from_system_time(modified))?;
        }
    }

    debug!(
        "Hard-link copy {:?} -> {:?}: {} linked, {} copied, {} symlinks, {} pruned",
        src, dst, stats.linked, stats.copied, stats.symlinks, stats.pruned
    );
    Ok(stats)
}

/// Byte-copy `src` to `dst` keeping permissions and timestamps
pub(crate) fn copy_preserving(src: &Path, dst: &Path) -> Result<()> {
    let metadata = fs::metadata(src)?;
    // fs::copy carries the permission bits over
    fs::copy(src, dst)?;
    filetime::set_file_times(
        dst,
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )?;
    Ok(())
}

fn ensure_directory(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => {
            fs::remove_file(path)?;
            fs::create_dir(path)?;
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir(path)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn prune_extras(dst: &Path, keep: &HashSet<PathBuf>) -> Result<usize> {
    let mut pruned = 0;
    let mut walker = WalkDir::new(dst).follow_links(false).min_depth(1).into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(dst)
            .map_err(|e| SnapbackError::internal(format!("walk escaped destination: {}", e)))?;
        if keep.contains(relative) {
            continue;
        }
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())?;
            walker.skip_current_dir();
        } else {
            fs::remove_file(entry.path())?;
        }
        trace!("Pruned {:?}", relative);
        pruned += 1;
    }
    Ok(pruned)
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}
