//! Configuration loading
//!
//! snapback reads a bash-style `KEY=value` file:
//!
//! ```text
//! DIRS='/home/me/Documents "/home/me/My Files"'
//! TARGETBASE='/home/me/.Snapshots'
//! RSYNC_PARAMS='--max-size=1.5m'
//! hsnaps=23
//! ```
//!
//! ## Discovery
//!
//! 1. an explicit `--config` path
//! 2. `$SNAPSHOTRC`
//! 3. `./.snapshotrc`
//! 4. `~/.snapshotrc`
//!
//! ## Modes
//!
//! A file named `.snapshotrc` outside the home directory puts snapback in
//! **project-local** mode: its directory becomes the workspace root, relative
//! paths are resolved against it, and every path the configuration names must
//! stay inside it. Any other file is **global** mode and requires absolute
//! paths.
//!
//! The whole file is validated once in [`Config::parse`]; a [`Config`] value
//! is always valid.

use crate::error::{Result, SnapbackError};
use crate::path_safety::{
    expand_tilde, is_dangerous_target, normalize_lexically, validate_workspace_path, WorkspaceContext,
};
use crate::store::SnapshotStore;
use crate::sync::Rsync;
use crate::tier::Retention;
use crate::utils::{expand_vars, split_words};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name that enables project-local mode
pub const LOCAL_CONFIG_NAME: &str = ".snapshotrc";

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "SNAPSHOTRC";

/// Validated snapback configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Source directories, absolute
    pub dirs: Vec<PathBuf>,
    /// Snapshot base directory, absolute
    pub target_base: PathBuf,
    /// Extra parameters appended to every rsync call
    pub rsync_params: Vec<String>,
    /// Highest slot index per tier
    pub retention: Retention,
    /// File the configuration was read from
    pub config_path: Option<PathBuf>,
    /// Workspace root in project-local mode
    pub workspace_root: Option<PathBuf>,
}

impl Config {
    /// Locate and load the configuration
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = locate(explicit)?;
        Self::from_file(&path)
    }

    /// Load a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapbackError::ConfigNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text, Some(path))
    }

    /// Parse and validate configuration text
    ///
    /// `path` decides the mode; without one the configuration is global.
    pub fn parse(text: &str, path: Option<&Path>) -> Result<Self> {
        let values = parse_assignments(text);
        let workspace_root = match path {
            Some(p) if is_local_config(p, dirs::home_dir().as_deref()) => Some(workspace_root_of(p)?),
            _ => None,
        };
        let is_local = workspace_root.is_some();

        let dirs_raw = values.get("DIRS").map(String::as_str).unwrap_or("");
        let dir_words = split_words(dirs_raw)?;
        if dir_words.is_empty() {
            return Err(SnapbackError::config("DIRS is required and cannot be empty"));
        }

        let target_raw = match values.get("TARGETBASE") {
            Some(v) if !v.is_empty() => v.clone(),
            _ if is_local => "./.snapshots".to_string(),
            _ => "~/.Snapshots".to_string(),
        };

        let rsync_params = values
            .get("RSYNC_PARAMS")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let retention = Retention {
            hourly: parse_count(&values, "hsnaps", 23)?,
            daily: parse_count(&values, "dsnaps", 7)?,
            weekly: parse_count(&values, "wsnaps", 4)?,
            monthly: parse_count(&values, "msnaps", 12)?,
        };

        let root = workspace_root.as_deref();
        let dirs = dir_words
            .iter()
            .map(|word| resolve_entry(word, root, "DIRS"))
            .collect::<Result<Vec<_>>>()?;
        let target_base = resolve_entry(&target_raw, root, "TARGETBASE")?;

        check_target(&target_raw, &target_base, root)?;
        if let Some(root) = root {
            for dir in &dirs {
                validate_workspace_path(dir, root, "config DIRS")?;
            }
            validate_workspace_path(&target_base, root, "config TARGETBASE")?;
        }

        Ok(Self {
            dirs,
            target_base,
            rsync_params,
            retention,
            config_path: path.map(Path::to_path_buf),
            workspace_root,
        })
    }

    /// Whether project-local mode is active
    pub fn is_local(&self) -> bool {
        self.workspace_root.is_some()
    }

    /// Workspace boundary for mutating operations
    pub fn workspace(&self) -> WorkspaceContext {
        match &self.workspace_root {
            Some(root) => WorkspaceContext::local(root),
            None => WorkspaceContext::global(),
        }
    }

    /// Snapshot store described by this configuration
    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.target_base, self.retention)
    }

    /// rsync wrapper with the configured parameters and mode filters
    pub fn syncer(&self) -> Rsync {
        Rsync::new()
            .with_params(self.rsync_params.iter().cloned())
            .with_local_filters(self.is_local())
    }

    /// Sample global configuration for the current user
    pub fn sample() -> String {
        let home = dirs::home_dir()
            .map(|h| h.display().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!(
            r#"# snapback configuration file
#
# Space-separated list of directories to back up
# For paths with spaces, use nested quotes:  DIRS='{home}/Documents "{home}/My Files"'
DIRS='{home}/Documents {home}/Projects'

# Base directory for snapshots
TARGETBASE='{home}/.Snapshots'

# Optional: additional rsync parameters
# Examples:
#   --max-size=1.5m        # Skip files larger than 1.5MB
#   --exclude=node_modules # Exclude node_modules directories
#   --exclude=*.tmp        # Exclude .tmp files
RSYNC_PARAMS='--max-size=1.5m'

# Optional: highest slot index kept per tier
#hsnaps=23
#dsnaps=7
#wsnaps=4
#msnaps=12
"#
        )
    }

    /// Sample project-local configuration (`.snapshotrc` in a project root)
    pub fn sample_local() -> String {
        r#"# snapback project-local configuration
#
# Paths are relative to the directory containing this file. Snapshots stay
# inside the project; .git, .snapshots and .gitignore'd files are skipped.
DIRS='.'

TARGETBASE='./.snapshots'

# Optional: additional rsync parameters
RSYNC_PARAMS=''
"#
        .to_string()
    }
}

/// Find the configuration file following the discovery order
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    locate_in(
        explicit,
        std::env::var_os(CONFIG_ENV),
        &cwd,
        dirs::home_dir().as_deref(),
    )
}

pub(crate) fn locate_in(
    explicit: Option<&Path>,
    env: Option<OsString>,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand_tilde(path);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(SnapbackError::ConfigNotFound(path))
        };
    }
    if let Some(value) = env.filter(|v| !v.is_empty()) {
        let path = expand_tilde(Path::new(&value));
        return if path.is_file() {
            Ok(path)
        } else {
            Err(SnapbackError::ConfigNotFound(path))
        };
    }

    let local = cwd.join(LOCAL_CONFIG_NAME);
    if local.is_file() {
        return Ok(local);
    }
    let home_config = home
        .map(|h| h.join(LOCAL_CONFIG_NAME))
        .unwrap_or_else(|| PathBuf::from("~").join(LOCAL_CONFIG_NAME));
    if home_config.is_file() {
        return Ok(home_config);
    }
    Err(SnapbackError::ConfigNotFound(home_config))
}

/// A `.snapshotrc` whose directory is not the home directory
pub(crate) fn is_local_config(path: &Path, home: Option<&Path>) -> bool {
    if path.file_name().and_then(|n| n.to_str()) != Some(LOCAL_CONFIG_NAME) {
        return false;
    }
    let parent = match fs::canonicalize(path).ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        Some(parent) => parent,
        None => return false,
    };
    match home.and_then(|h| fs::canonicalize(h).ok()) {
        Some(home) => parent != home,
        None => true,
    }
}

fn workspace_root_of(path: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(path)?;
    canonical
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| SnapbackError::config(format!("{} has no parent directory", path.display())))
}

/// `KEY=value` pairs; comments, blank lines and other lines are ignored
fn parse_assignments(text: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            debug!("Ignoring config line {:?}", line);
            continue;
        };
        let key = key.trim();
        if !is_identifier(key) {
            debug!("Ignoring config line {:?}", line);
            continue;
        }
        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    values
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_count(values: &HashMap<String, String>, key: &str, default: u32) -> Result<u32> {
    match values.get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(SnapbackError::config(format!(
                "{} must be a positive integer, got {:?}",
                key, raw
            ))),
        },
    }
}

/// Expand variables and `~`, then anchor relative paths
fn resolve_entry(word: &str, root: Option<&Path>, key: &str) -> Result<PathBuf> {
    let expanded = expand_tilde(Path::new(&expand_vars(word)));
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    match root {
        Some(root) => Ok(normalize_lexically(&root.join(expanded))),
        None => Err(SnapbackError::config(format!(
            "{} entry must be an absolute path: {}",
            key, word
        ))),
    }
}

fn check_target(raw: &str, resolved: &Path, root: Option<&Path>) -> Result<()> {
    let expanded = expand_tilde(Path::new(&expand_vars(raw)));
    if let Some(danger) = is_dangerous_target(&expanded, root.is_some()) {
        if danger.is_advisory() {
            warn!("TARGETBASE: {}", danger.reason);
        } else {
            return Err(SnapbackError::DangerousPath {
                path: expanded,
                reason: danger.reason,
            });
        }
    }
    // Relative targets were judged against the cwd above; judge the anchored path too
    if let Some(danger) = is_dangerous_target(&normalize_lexically(resolved), false) {
        return Err(SnapbackError::DangerousPath {
            path: resolved.to_path_buf(),
            reason: danger.reason,
        });
    }
    Ok(())
}
