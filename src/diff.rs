//! Line-level diff computation for text files
//!
//! Used by `snapback diff --text` to show how a file changed since an older
//! snapshot without shelling out to an external tool.
//!
//! ## Overview
//!
//! The algorithm strips the common prefix and suffix, finds the Longest
//! Common Subsequence (LCS) of the remaining lines with dynamic programming,
//! turns it into keep/delete/insert operations and groups those into
//! unified-diff hunks with configurable context.
//!
//! The LCS table needs one cell per pair of differing lines. Above
//! [`DiffOptions::max_lcs_cells`] the differing region is reported as one
//! replacement instead, so memory stays bounded for any input.
//!
//! ## Example
//!
//! ```rust
//! use snapback::diff::{compute_line_diff, DiffOptions, LineChange};
//!
//! let old = b"line1\nline2\nline3";
//! let new = b"line1\nline2 modified\nline3\nline4";
//!
//! let hunks = compute_line_diff(old, new, &DiffOptions::default());
//! assert_eq!(hunks.len(), 1);
//! assert!(hunks[0].changes.iter().any(|c| matches!(c, LineChange::Added(_, _))));
//! ```

use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Options controlling diff generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Unchanged lines shown around each change
    pub context_lines: usize,
    /// Compare lines with leading/trailing whitespace trimmed
    pub ignore_whitespace: bool,
    /// Larger inputs are not diffed line by line
    pub max_file_size: u64,
    /// Largest LCS table (old lines x new lines) computed exactly
    pub max_lcs_cells: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            ignore_whitespace: false,
            max_file_size: 10 * 1024 * 1024,
            max_lcs_cells: 4 * 1024 * 1024,
        }
    }
}

/// One line of a hunk; numbers are 1-based
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LineChange {
    /// Unchanged line (old line number)
    Context(usize, String),
    /// Line only in the old text (old line number)
    Deleted(usize, String),
    /// Line only in the new text (new line number)
    Added(usize, String),
}

/// A contiguous region of changes with surrounding context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffHunk {
    /// First old line covered
    pub from_line: usize,
    /// Old lines covered
    pub from_count: usize,
    /// First new line covered
    pub to_line: usize,
    /// New lines covered
    pub to_count: usize,
    /// Lines in order
    pub changes: Vec<LineChange>,
}

impl fmt::Display for DiffHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{},{} +{},{} @@",
            self.from_line, self.from_count, self.to_line, self.to_count
        )?;
        for change in &self.changes {
            match change {
                LineChange::Context(_, line) => writeln!(f, " {}", line)?,
                LineChange::Deleted(_, line) => writeln!(f, "-{}", line)?,
                LineChange::Added(_, line) => writeln!(f, "+{}", line)?,
            }
        }
        Ok(())
    }
}

/// Complete comparison of two versions of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    /// Label for the old side (`---`)
    pub old_label: String,
    /// Label for the new side (`+++`)
    pub new_label: String,
    /// Either side looked binary; no hunks were computed
    pub is_binary: bool,
    /// Hunks in order
    pub hunks: Vec<DiffHunk>,
    /// Lines added
    pub lines_added: usize,
    /// Lines deleted
    pub lines_deleted: usize,
}

impl FileDiff {
    /// No differences found
    pub fn is_identical(&self) -> bool {
        !self.is_binary && self.hunks.is_empty()
    }
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_binary {
            return writeln!(f, "Binary files {} and {} differ", self.old_label, self.new_label);
        }
        writeln!(f, "--- {}", self.old_label)?;
        writeln!(f, "+++ {}", self.new_label)?;
        for hunk in &self.hunks {
            write!(f, "{}", hunk)?;
        }
        Ok(())
    }
}

/// Compute line-level diff between two text contents
///
/// Invalid UTF-8 is replaced lossily.
pub fn compute_line_diff(old_content: &[u8], new_content: &[u8], options: &DiffOptions) -> Vec<DiffHunk> {
    let old_text = String::from_utf8_lossy(old_content);
    let new_text = String::from_utf8_lossy(new_content);
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();

    if old_lines.is_empty() && new_lines.is_empty() {
        return vec![];
    }

    let changes = compute_changes(&old_lines, &new_lines, options);
    create_hunks(&changes, &old_lines, &new_lines, options.context_lines)
}

/// Diff two file contents into a [`FileDiff`]
pub fn create_file_diff(
    old_label: impl Into<String>,
    new_label: impl Into<String>,
    old_content: &[u8],
    new_content: &[u8],
    options: &DiffOptions,
) -> FileDiff {
    // Identical binary content is reported as identical, not as binary
    let is_binary = (is_binary_content(old_content) || is_binary_content(new_content))
        && old_content != new_content;
    let hunks = if is_binary {
        vec![]
    } else {
        compute_line_diff(old_content, new_content, options)
    };

    let mut lines_added = 0;
    let mut lines_deleted = 0;
    for change in hunks.iter().flat_map(|h| &h.changes) {
        match change {
            LineChange::Added(_, _) => lines_added += 1,
            LineChange::Deleted(_, _) => lines_deleted += 1,
            LineChange::Context(_, _) => {}
        }
    }

    FileDiff {
        old_label: old_label.into(),
        new_label: new_label.into(),
        is_binary,
        hunks,
        lines_added,
        lines_deleted,
    }
}

/// Check if content appears to be binary (NUL byte in the first 8KB)
pub fn is_binary_content(content: &[u8]) -> bool {
    let check_len = content.len().min(8192);
    content[..check_len].contains(&0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeOp {
    Keep(usize, usize), // (old_line_idx, new_line_idx)
    Delete(usize),      // old_line_idx
    Insert(usize),      // new_line_idx
}

impl ChangeOp {
    fn is_change(self) -> bool {
        !matches!(self, ChangeOp::Keep(_, _))
    }
}

fn compute_changes(old_lines: &[&str], new_lines: &[&str], options: &DiffOptions) -> Vec<ChangeOp> {
    let ws = options.ignore_whitespace;
    let prefix = old_lines
        .iter()
        .zip(new_lines)
        .take_while(|(a, b)| lines_equal(a, b, ws))
        .count();
    let suffix = old_lines[prefix..]
        .iter()
        .rev()
        .zip(new_lines[prefix..].iter().rev())
        .take_while(|(a, b)| lines_equal(a, b, ws))
        .count();
    let old_end = old_lines.len() - suffix;
    let new_end = new_lines.len() - suffix;
    let old_mid = &old_lines[prefix..old_end];
    let new_mid = &new_lines[prefix..new_end];

    let mut changes = Vec::with_capacity(old_lines.len().max(new_lines.len()));
    changes.extend((0..prefix).map(|i| ChangeOp::Keep(i, i)));

    let fits = (old_mid.len() + 1)
        .checked_mul(new_mid.len() + 1)
        .is_some_and(|cells| cells <= options.max_lcs_cells);
    if old_mid.is_empty() || new_mid.is_empty() || !fits {
        if !old_mid.is_empty() && !new_mid.is_empty() {
            warn!(
                "Changed region of {} x {} lines is too large for an exact diff; showing it as one replacement",
                old_mid.len(),
                new_mid.len()
            );
        }
        changes.extend((prefix..old_end).map(ChangeOp::Delete));
        changes.extend((prefix..new_end).map(ChangeOp::Insert));
    } else {
        let lcs = compute_lcs(old_mid, new_mid, ws);
        lcs_to_changes(&lcs, prefix, old_end, new_end, &mut changes);
    }

    changes.extend((0..suffix).map(|k| ChangeOp::Keep(old_end + k, new_end + k)));
    changes
}

/// LCS of two line runs as index pairs relative to the runs
fn compute_lcs(old_lines: &[&str], new_lines: &[&str], ignore_whitespace: bool) -> Vec<(usize, usize)> {
    let m = old_lines.len();
    let n = new_lines.len();
    let width = n + 1;

    // Row-major (m + 1) x (n + 1) table
    let mut dp = vec![0u32; (m + 1) * width];
    for i in 1..=m {
        for j in 1..=n {
            dp[i * width + j] = if lines_equal(old_lines[i - 1], new_lines[j - 1], ignore_whitespace) {
                dp[(i - 1) * width + j - 1] + 1
            } else {
                dp[(i - 1) * width + j].max(dp[i * width + j - 1])
            };
        }
    }

    let mut lcs = Vec::new();
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if lines_equal(old_lines[i - 1], new_lines[j - 1], ignore_whitespace) {
            lcs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if dp[(i - 1) * width + j] > dp[i * width + j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    lcs.reverse();
    lcs
}

fn lines_equal(a: &str, b: &str, ignore_whitespace: bool) -> bool {
    if ignore_whitespace {
        a.trim() == b.trim()
    } else {
        a == b
    }
}

/// Append operations for lines `start..old_end` and `start..new_end`
/// given their LCS (indices relative to `start`)
fn lcs_to_changes(
    lcs: &[(usize, usize)],
    start: usize,
    old_end: usize,
    new_end: usize,
    changes: &mut Vec<ChangeOp>,
) {
    let (mut old_idx, mut new_idx) = (start, start);

    for &(lcs_old, lcs_new) in lcs {
        let (lcs_old, lcs_new) = (start + lcs_old, start + lcs_new);
        while old_idx < lcs_old {
            changes.push(ChangeOp::Delete(old_idx));
            old_idx += 1;
        }
        while new_idx < lcs_new {
            changes.push(ChangeOp::Insert(new_idx));
            new_idx += 1;
        }
        changes.push(ChangeOp::Keep(old_idx, new_idx));
        old_idx += 1;
        new_idx += 1;
    }
    changes.extend((old_idx..old_end).map(ChangeOp::Delete));
    changes.extend((new_idx..new_end).map(ChangeOp::Insert));
}

/// Group operations into hunks; changes closer than `2 * context` share a hunk
fn create_hunks(changes: &[ChangeOp], old_lines: &[&str], new_lines: &[&str], context: usize) -> Vec<DiffHunk> {
    // Lines of each side consumed before operation i
    let mut positions = Vec::with_capacity(changes.len() + 1);
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for op in changes {
        positions.push((old_pos, new_pos));
        match op {
            ChangeOp::Keep(_, _) => {
                old_pos += 1;
                new_pos += 1;
            }
            ChangeOp::Delete(_) => old_pos += 1,
            ChangeOp::Insert(_) => new_pos += 1,
        }
    }
    positions.push((old_pos, new_pos));

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (i, op) in changes.iter().enumerate() {
        if !op.is_change() {
            continue;
        }
        let start = i.saturating_sub(context);
        let end = (i + context + 1).min(changes.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }

    ranges
        .into_iter()
        .map(|(start, end)| {
            let (old_start, new_start) = positions[start];
            let (old_end, new_end) = positions[end];
            let from_count = old_end - old_start;
            let to_count = new_end - new_start;
            let lines = changes[start..end]
                .iter()
                .map(|op| match *op {
                    ChangeOp::Keep(o, _) => LineChange::Context(o + 1, old_lines[o].to_string()),
                    ChangeOp::Delete(o) => LineChange::Deleted(o + 1, old_lines[o].to_string()),
                    ChangeOp::Insert(n) => LineChange::Added(n + 1, new_lines[n].to_string()),
                })
                .collect();
            DiffHunk {
                // An empty side points at the line before the hunk, as diff -u does
                from_line: if from_count == 0 { old_start } else { old_start + 1 },
                from_count,
                to_line: if to_count == 0 { new_start } else { new_start + 1 },
                to_count,
                changes: lines,
            }
        })
        .collect()
}
