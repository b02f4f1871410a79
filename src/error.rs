//! Error types for snapback
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error
//! side is [`SnapbackError`]. Variants fall into a small taxonomy exposed via
//! [`SnapbackError::kind`] so callers (and the CLI) can decide what is fatal:
//!
//! - **NotFound**: a snapshot, tag, `hour-0` or the configuration file is missing
//! - **AlreadyExists**: a tag name is already taken
//! - **Validation**: dangerous paths, traversal, workspace escapes, bad config
//! - **ExternalTool**: rsync or a diff tool failed or could not be started
//! - **Io**: everything the filesystem throws at us

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in snapback
pub type Result<T> = std::result::Result<T, SnapbackError>;

/// Coarse classification of a [`SnapbackError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A named snapshot, tag or file does not exist
    NotFound,
    /// The target name is already in use
    AlreadyExists,
    /// Input was rejected before touching the filesystem
    Validation,
    /// An external subprocess failed
    ExternalTool,
    /// Underlying filesystem error
    Io,
}

/// Main error type for all snapback operations
#[derive(Debug, Error)]
pub enum SnapbackError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// JSON serialization error (list output)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path required by an operation does not exist
    #[error("Path does not exist: {0:?}")]
    PathNotFound(PathBuf),

    /// Snapshot slot or tag used as a source does not exist
    #[error("Snapshot does not exist: {0}")]
    SnapshotNotFound(String),

    /// No snapshot holds the requested version of a file
    #[error("Could not find {file} in snapshot {periods_ago} periods ago")]
    VersionNotFound {
        /// File name searched for
        file: String,
        /// How many versions back
        periods_ago: usize,
    },

    /// Tag to delete does not exist
    #[error("Tag does not exist: {0}")]
    TagNotFound(String),

    /// Tag name already used by a directory in the snapshot base
    #[error("Tag already exists: {0}")]
    TagExists(String),

    /// Configuration file could not be found
    #[error("Configuration file not found: {0:?}")]
    ConfigNotFound(PathBuf),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Path matches a system directory, the home root, or is otherwise unsafe
    #[error("Dangerous path {path:?}: {reason}")]
    DangerousPath {
        /// Offending path
        path: PathBuf,
        /// Why it was rejected, with a suggested alternative
        reason: String,
    },

    /// Raw path contains a `..` component
    #[error("{operation}: path {path:?} contains '..' traversal (workspace: {workspace:?})")]
    PathTraversal {
        /// Operation that was attempted
        operation: String,
        /// Offending path
        path: PathBuf,
        /// Workspace root
        workspace: PathBuf,
    },

    /// Resolved path lies outside the workspace root
    #[error("{operation}: path {path:?} is outside workspace {workspace:?}")]
    OutsideWorkspace {
        /// Operation that was attempted
        operation: String,
        /// Offending path
        path: PathBuf,
        /// Workspace root
        workspace: PathBuf,
    },

    /// Standard slot names are reserved for rotation
    #[error("Cannot use standard snapshot name {0:?} as a tag; standard slots are managed by rotation")]
    StandardSnapshotName(String),

    /// Any other rejected argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Sync subprocess exited with a failure status
    #[error("Sync of {source_dir:?} into {destination:?} failed: {status}")]
    SyncFailed {
        /// Sync source directory
        source_dir: PathBuf,
        /// Sync destination directory
        destination: PathBuf,
        /// Exit status description
        status: String,
    },

    /// External executable could not be started
    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    /// External tool ran but reported an error
    #[error("External tool {tool} failed: {message}")]
    ToolFailed {
        /// Tool name
        tool: String,
        /// Captured error output or status
        message: String,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnapbackError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnapbackError::Internal(msg.into())
    }

    /// Create a configuration validation error
    pub fn config(msg: impl Into<String>) -> Self {
        SnapbackError::InvalidConfig(msg.into())
    }

    /// Create an invalid-argument error
    pub fn invalid(msg: impl Into<String>) -> Self {
        SnapbackError::InvalidArgument(msg.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnapbackError::PathNotFound(_)
            | SnapbackError::SnapshotNotFound(_)
            | SnapbackError::VersionNotFound { .. }
            | SnapbackError::TagNotFound(_)
            | SnapbackError::ConfigNotFound(_) => ErrorKind::NotFound,
            SnapbackError::TagExists(_) => ErrorKind::AlreadyExists,
            SnapbackError::InvalidConfig(_)
            | SnapbackError::DangerousPath { .. }
            | SnapbackError::PathTraversal { .. }
            | SnapbackError::OutsideWorkspace { .. }
            | SnapbackError::StandardSnapshotName(_)
            | SnapbackError::InvalidArgument(_) => ErrorKind::Validation,
            SnapbackError::SyncFailed { .. }
            | SnapbackError::ToolNotFound(_)
            | SnapbackError::ToolFailed { .. } => ErrorKind::ExternalTool,
            SnapbackError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            SnapbackError::Io(_)
            | SnapbackError::WalkDir(_)
            | SnapbackError::Json(_)
            | SnapbackError::Internal(_) => ErrorKind::Io,
        }
    }

    /// Check if this error was raised by path validation
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Check if this error means something was missing
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnapbackError::SnapshotNotFound(name) => {
                format!("Snapshot '{}' does not exist. Use 'snapback list' to see available snapshots.", name)
            }
            SnapbackError::TagNotFound(name) => {
                format!("Tag '{}' does not exist. Use 'snapback list --tags' to see tagged snapshots.", name)
            }
            SnapbackError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\nRun 'snapback sampleconfig > {}' to create one.",
                    path.display(),
                    path.display()
                )
            }
            SnapbackError::ToolNotFound(tool) => {
                format!("'{}' was not found on PATH. Install it or choose another tool.", tool)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SnapbackError::SnapshotNotFound("hour-3".to_string());
        assert_eq!(err.to_string(), "Snapshot does not exist: hour-3");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(SnapbackError::TagExists("x".into()).kind(), ErrorKind::AlreadyExists);
        assert_eq!(SnapbackError::TagNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert!(SnapbackError::StandardSnapshotName("hour-0".into()).is_validation());
        assert_eq!(SnapbackError::ToolNotFound("rsync".into()).kind(), ErrorKind::ExternalTool);
        assert!(SnapbackError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).is_not_found());
        assert_eq!(
            SnapbackError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn test_workspace_error_mentions_everything() {
        let err = SnapbackError::OutsideWorkspace {
            operation: "test operation".into(),
            path: PathBuf::from("/tmp/outside"),
            workspace: PathBuf::from("/tmp/workspace"),
        };
        let msg = err.to_string();
        assert!(msg.contains("test operation"));
        assert!(msg.contains("/tmp/outside"));
        assert!(msg.contains("workspace"));
    }
}
