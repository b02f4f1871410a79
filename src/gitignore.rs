//! Keep the snapshot directory out of git in project-local mode

use crate::error::Result;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::info;

/// Header written above entries snapback adds
pub const SECTION_HEADER: &str = "# snapback - local snapshot backups";

/// Non-comment patterns currently in a `.gitignore` (empty if the file is missing)
pub fn patterns(path: &Path) -> Result<HashSet<String>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Append the entries missing from `path` under [`SECTION_HEADER`]
///
/// Creates the file if needed. Returns whether anything was written.
pub fn ensure_entries(path: &Path, entries: &[&str]) -> Result<bool> {
    let existing = patterns(path)?;
    let missing: Vec<&str> = entries
        .iter()
        .copied()
        .filter(|entry| !existing.contains(*entry))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let mut content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => "# .gitignore\n".to_string(),
        Err(e) => return Err(e.into()),
    };
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push('\n');
    content.push_str(SECTION_HEADER);
    content.push('\n');
    for entry in &missing {
        content.push_str(entry);
        content.push('\n');
    }
    fs::write(path, content)?;
    info!("Added {:?} to {:?}", missing, path);
    Ok(true)
}
