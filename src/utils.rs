//! Small string and formatting helpers
//!
//! - [`format_size`]: compact human readable sizes for listings
//! - [`split_words`]: shell-style word splitting for `DIRS=` values
//! - [`expand_vars`]: `$VAR` / `${VAR}` expansion

use crate::error::{Result, SnapbackError};

/// Format a byte count the way `ls -h` does (`512B`, `1.5K`, `3.2M`)
///
/// ```rust
/// use snapback::utils::format_size;
///
/// assert_eq!(format_size(512), "512B");
/// assert_eq!(format_size(1536), "1.5K");
/// assert_eq!(format_size(5 * 1024 * 1024), "5.0M");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }
    format!("{:.1}{}", size, UNITS[unit_idx])
}

/// Split a string into words, honoring single quotes, double quotes and
/// backslash escapes
///
/// ```rust
/// use snapback::utils::split_words;
///
/// let words = split_words(r#"/srv/www "/home/me/My Files""#).unwrap();
/// assert_eq!(words, vec!["/srv/www", "/home/me/My Files"]);
/// ```
///
/// # Errors
///
/// [`SnapbackError::InvalidConfig`] on an unterminated quote or a trailing
/// backslash.
pub fn split_words(input: &str) -> Result<Vec<String>> {
    shlex::split(input)
        .ok_or_else(|| SnapbackError::config(format!("unbalanced quotes or trailing backslash in {:?}", input)))
}

/// Expand `$VAR` and `${VAR}` from the environment
///
/// Unknown variables are left untouched.
pub fn expand_vars(input: &str) -> String {
    expand_vars_with(input, |name| std::env::var(name).ok())
}

pub(crate) fn expand_vars_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}
