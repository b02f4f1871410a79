//! Path validation and workspace confinement
//!
//! Every destructive filesystem operation in snapback (deleting a slot,
//! renaming one tier into another, pruning a path from `hour-0`) passes
//! through this module first.
//!
//! ## Two layers
//!
//! 1. **Lexical**: a raw path containing a `..` component is rejected before
//!    anything is resolved.
//! 2. **Resolved**: the path is resolved through symlinks and must be equal
//!    to or below the resolved workspace root. Resolution failures (broken
//!    symlinks, permission errors, loops) count as *outside*.
//!
//! Both layers must pass. In global mode there is no workspace root and only
//! the dangerous-target deny list applies.
//!
//! ## Example
//!
//! ```rust,no_run
//! use snapback::path_safety::{is_dangerous_target, WorkspaceContext};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! assert!(is_dangerous_target(Path::new("/"), false).is_some());
//!
//! let ctx = WorkspaceContext::local("/home/me/project");
//! ctx.validate(Path::new("/home/me/project/.snapshots/hour-0"), "rotate")?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SnapbackError};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// System directories that may never be used as (or removed as) a snapshot target
pub const SYSTEM_DIRECTORIES: &[&str] = &[
    "/", "/usr", "/etc", "/var", "/tmp", "/home", "/boot", "/sys", "/proc", "/dev", "/bin",
    "/sbin", "/lib", "/lib64", "/opt", "/root", "/run", "/srv", "/mnt", "/media",
];

const SAFE_SUGGESTION: &str = "use a dedicated subdirectory such as './.snapshots' or '~/.Snapshots'";

/// Why a path was flagged by [`is_dangerous_target`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerKind {
    /// Exactly one of [`SYSTEM_DIRECTORIES`]
    SystemDirectory,
    /// The user's home directory itself
    HomeDirectory,
    /// Contains a `..` component (local mode)
    ParentTraversal,
    /// Absolute path in local mode; the caller decides whether this is fatal
    AbsoluteInLocal,
}

/// A dangerous-target verdict with a human readable reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Danger {
    /// Category of the problem
    pub kind: DangerKind,
    /// Explanation including a suggested safe alternative
    pub reason: String,
}

impl Danger {
    fn new(kind: DangerKind, reason: String) -> Self {
        Self { kind, reason }
    }

    /// Whether the caller may downgrade this verdict to a warning
    pub fn is_advisory(&self) -> bool {
        self.kind == DangerKind::AbsoluteInLocal
    }
}

/// Decide whether `path` is a dangerous snapshot target
///
/// Returns `None` when the path is acceptable. `~` is expanded and relative
/// paths are made absolute against the current directory before comparing
/// against the deny list and the home directory.
pub fn is_dangerous_target(path: &Path, is_local: bool) -> Option<Danger> {
    let expanded = expand_tilde(path);
    if is_local && has_parent_component(&expanded) {
        return Some(Danger::new(
            DangerKind::ParentTraversal,
            format!(
                "{} contains a parent directory ('..') component and may escape the workspace; \
                 keep snapshots within the project, e.g. './.snapshots'",
                path.display()
            ),
        ));
    }

    let absolute = normalize_lexically(&absolutize(&expanded));
    let resolved = resolve_path(&absolute).unwrap_or_else(|_| absolute.clone());

    for candidate in [&absolute, &resolved] {
        if SYSTEM_DIRECTORIES.iter().any(|dir| candidate.as_path() == Path::new(dir)) {
            return Some(Danger::new(
                DangerKind::SystemDirectory,
                format!(
                    "{} is a system directory and cannot hold snapshots; {}",
                    candidate.display(),
                    SAFE_SUGGESTION
                ),
            ));
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_resolved = resolve_path(&home).unwrap_or(home);
        if resolved == home_resolved || absolute == home_resolved {
            return Some(Danger::new(
                DangerKind::HomeDirectory,
                format!(
                    "{} is the home directory root; snapshots would rotate over your files. {}",
                    home_resolved.display(),
                    SAFE_SUGGESTION
                ),
            ));
        }
    }

    if is_local && expanded.is_absolute() {
        return Some(Danger::new(
            DangerKind::AbsoluteInLocal,
            format!(
                "{} is an absolute path in project-local mode; prefer a relative path such as './.snapshots'",
                path.display()
            ),
        ));
    }

    None
}

/// Check whether `path` resolves to `workspace_root` or somewhere below it
///
/// Any resolution failure is treated as unsafe.
pub fn is_within_workspace(path: &Path, workspace_root: &Path) -> bool {
    let root = match resolve_path(workspace_root) {
        Ok(root) => root,
        Err(e) => {
            debug!("Cannot resolve workspace root {:?}: {}", workspace_root, e);
            return false;
        }
    };
    match resolve_path(path) {
        Ok(resolved) => {
            trace!("Resolved {:?} -> {:?}", path, resolved);
            resolved.starts_with(&root)
        }
        Err(e) => {
            debug!("Cannot resolve {:?}: {}", path, e);
            false
        }
    }
}

/// Validate that `path` is confined to `workspace_root`
///
/// # Errors
///
/// - [`SnapbackError::PathTraversal`] if the raw path contains `..`
/// - [`SnapbackError::OutsideWorkspace`] if the resolved path escapes the root
pub fn validate_workspace_path(path: &Path, workspace_root: &Path, operation: &str) -> Result<()> {
    if has_parent_component(path) {
        return Err(SnapbackError::PathTraversal {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            workspace: workspace_root.to_path_buf(),
        });
    }
    if !is_within_workspace(path, workspace_root) {
        return Err(SnapbackError::OutsideWorkspace {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            workspace: workspace_root.to_path_buf(),
        });
    }
    Ok(())
}

/// Workspace boundary passed explicitly into every mutating operation
///
/// `root` is `Some` only in project-local mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceContext {
    root: Option<PathBuf>,
}

impl WorkspaceContext {
    /// Global (home directory) mode: no confinement
    pub fn global() -> Self {
        Self { root: None }
    }

    /// Project-local mode confined to `root`
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    /// The workspace root, if any
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Whether a workspace root is defined
    pub fn is_local(&self) -> bool {
        self.root.is_some()
    }

    /// Validate `path` against the root; no-op in global mode
    pub fn validate(&self, path: &Path, operation: &str) -> Result<()> {
        match &self.root {
            Some(root) => validate_workspace_path(path, root, operation),
            None => Ok(()),
        }
    }
}

/// Remove `path` recursively after passing it through every safety gate
///
/// Refuses system directories and the home root in all modes, and paths
/// outside the workspace in local mode. Symlinks are unlinked, never
/// followed. A missing path is not an error.
pub fn safe_remove(path: &Path, ctx: &WorkspaceContext, operation: &str) -> Result<()> {
    if let Some(danger) = is_dangerous_target(path, false) {
        return Err(SnapbackError::DangerousPath {
            path: path.to_path_buf(),
            reason: danger.reason,
        });
    }
    ctx.validate(path, operation)?;

    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        // remove_dir_all does not follow symlinks found inside the tree
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    debug!("Removed {:?} ({})", path, operation);
    Ok(())
}

/// Resolve a path through symlinks, tolerating a non-existent tail
///
/// The deepest existing ancestor is canonicalized and the remaining
/// components are applied lexically. Errors other than "not found" on the
/// existing part are returned.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = absolutize(path);
    match fs::canonicalize(&absolute) {
        Ok(p) => return Ok(p),
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        Err(_) => {}
    }

    // A dangling symlink exists but cannot be canonicalized
    if fs::symlink_metadata(&absolute).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("broken symlink: {}", absolute.display()),
        ));
    }

    let existing = absolute
        .ancestors()
        .skip(1)
        .find(|ancestor| fs::symlink_metadata(ancestor).is_ok())
        .unwrap_or_else(|| Path::new("/"));
    let tail = absolute.strip_prefix(existing).unwrap_or(Path::new(""));

    let mut resolved = fs::canonicalize(existing)?;
    for component in tail.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => resolved.push(part),
            _ => {}
        }
    }
    Ok(resolved)
}

/// Whether the raw path contains a `..` component
pub fn has_parent_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Join a relative path onto the current directory
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Collapse `.` and `..` without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_system_directories_are_dangerous() {
        for dir in ["/", "/usr", "/etc", "/proc"] {
            let danger = is_dangerous_target(Path::new(dir), false).unwrap();
            assert_eq!(danger.kind, DangerKind::SystemDirectory);
            assert!(danger.reason.contains("system directory"));
            assert!(danger.reason.contains(".snapshots"));
        }
    }

    #[test]
    fn test_home_root_is_dangerous() {
        let home = dirs::home_dir().unwrap();
        let danger = is_dangerous_target(&home, false).unwrap();
        assert!(matches!(danger.kind, DangerKind::HomeDirectory | DangerKind::SystemDirectory));
    }

    #[test]
    fn test_local_mode_flags() {
        let danger = is_dangerous_target(Path::new(".."), true).unwrap();
        assert_eq!(danger.kind, DangerKind::ParentTraversal);
        assert!(danger.reason.contains(".."));

        let danger = is_dangerous_target(Path::new("/srv/outside/snaps"), true).unwrap();
        assert_eq!(danger.kind, DangerKind::AbsoluteInLocal);
        assert!(danger.is_advisory());

        assert!(is_dangerous_target(Path::new("./.snapshots"), true).is_none());
    }

    #[test]
    fn test_safe_subdirectory() {
        let temp = TempDir::new().unwrap();
        assert!(is_dangerous_target(&temp.path().join(".snapshots"), false).is_none());
    }

    #[test]
    fn test_within_workspace() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        fs::create_dir(&workspace).unwrap();
        fs::create_dir(workspace.join("inside")).unwrap();

        assert!(is_within_workspace(&workspace, &workspace));
        assert!(is_within_workspace(&workspace.join("inside"), &workspace));
        // Not yet created paths are judged by their existing ancestor
        assert!(is_within_workspace(&workspace.join("inside/new/deeper"), &workspace));
        assert!(!is_within_workspace(&temp.path().join("outside"), &workspace));
        assert!(!is_within_workspace(&workspace.join("inside/../.."), &workspace));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_detected() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        let outside = temp.path().join("outside");
        fs::create_dir(&workspace).unwrap();
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, workspace.join("link")).unwrap();

        assert!(!is_within_workspace(&workspace.join("link"), &workspace));
        assert!(!is_within_workspace(&workspace.join("link/child"), &workspace));
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_fails_closed() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path();
        std::os::unix::fs::symlink(workspace.join("missing"), workspace.join("dangling")).unwrap();
        assert!(!is_within_workspace(&workspace.join("dangling"), workspace));
    }

    #[test]
    fn test_validate_rejects_traversal_even_if_missing() {
        let temp = TempDir::new().unwrap();
        let err = validate_workspace_path(Path::new("../outside"), temp.path(), "test").unwrap_err();
        assert!(matches!(err, SnapbackError::PathTraversal { .. }));
        assert!(err.to_string().contains("test"));
    }

    #[test]
    fn test_validate_outside_workspace_message() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        fs::create_dir(&workspace).unwrap();
        let outside = temp.path().join("outside");

        let err = validate_workspace_path(&outside, &workspace, "test operation").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("test operation"));
        assert!(msg.contains("outside workspace"));
        assert!(msg.contains(&workspace.display().to_string()));
    }

    #[test]
    fn test_context_global_is_noop() {
        let ctx = WorkspaceContext::global();
        assert!(!ctx.is_local());
        ctx.validate(Path::new("/definitely/elsewhere"), "noop").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_safe_remove_does_not_follow_symlinks() {
        let temp = TempDir::new().unwrap();
        let inside = temp.path().join("inside");
        let outside = temp.path().join("outside");
        fs::create_dir(&inside).unwrap();
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("important.txt"), "important data").unwrap();
        std::os::unix::fs::symlink(&outside, inside.join("link_to_outside")).unwrap();

        safe_remove(&inside, &WorkspaceContext::global(), "test").unwrap();

        assert!(!inside.exists());
        assert_eq!(fs::read_to_string(outside.join("important.txt")).unwrap(), "important data");
    }

    #[test]
    fn test_safe_remove_respects_workspace() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        let inside = workspace.join("inside");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&inside).unwrap();
        fs::create_dir(&outside).unwrap();
        let ctx = WorkspaceContext::local(&workspace);

        safe_remove(&inside, &ctx, "test").unwrap();
        assert!(!inside.exists());

        let err = safe_remove(&outside, &ctx, "test").unwrap_err();
        assert!(err.to_string().contains("outside workspace"));
        assert!(outside.exists());
    }

    #[test]
    fn test_safe_remove_refuses_system_directory() {
        let err = safe_remove(Path::new("/usr"), &WorkspaceContext::global(), "test").unwrap_err();
        assert!(matches!(err, SnapbackError::DangerousPath { .. }));
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(normalize_lexically(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
    }
}
