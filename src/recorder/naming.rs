use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::SegmentId;

/// Directory (inside the output dir) holding files still being recorded
pub const PARTIAL_DIR: &str = ".partial";

const MAX_NAME_LEN: usize = 180;

/// Make a string safe to use as a file name
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Collapse runs of "_" left by adjacent forbidden characters
    let mut collapsed = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    let cleaned = collapsed.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = cleaned.chars().take(MAX_NAME_LEN).collect();
    let truncated = truncated.trim();

    // Leading dots would hide the file (and clash with the partial dir)
    let truncated = truncated.trim_start_matches('.');

    if truncated.is_empty() {
        "unknown".to_string()
    } else {
        truncated.to_string()
    }
}

/// Tentative path for a segment while it is being recorded
pub fn partial_path(
    output_dir: &Path,
    base: &str,
    started: DateTime<Utc>,
    segment: SegmentId,
    extension: &str,
) -> PathBuf {
    output_dir.join(PARTIAL_DIR).join(format!(
        "{}.{}.{}.{}",
        sanitize(base),
        started.format("%Y%m%dT%H%M%S"),
        segment,
        extension
    ))
}

/// First free `<base>.<ext>`, `<base> (2).<ext>`, ... in `dir`
pub fn unique_path(dir: &Path, base: &str, extension: &str) -> PathBuf {
    let base = sanitize(base);
    let candidate = dir.join(format!("{}.{}", base, extension));
    if !candidate.exists() {
        return candidate;
    }

    (2..)
        .map(|i| dir.join(format!("{} ({}).{}", base, i, extension)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
