// SPDX-License-Identifier: GPL-3.0-only

//! Line-oriented edits of host configuration files

use std::path::Path;

use node_sys::fs::{atomic_write, read_optional};
use tracing::debug;

use crate::Result;

/// Replace the lines `matches` selects with `line`.
///
/// The first matching line is replaced in place and later ones dropped;
/// without a match `line` is appended. `None` removes every matching line.
/// A missing file is created.
pub fn replace_lines<F>(path: &Path, matches: F, line: Option<&str>) -> Result<()>
where
    F: Fn(&str) -> bool,
{
    let content = read_optional(path)?.unwrap_or_default();
    let mut lines = Vec::new();
    let mut placed = false;

    for current in content.lines() {
        if !matches(current) {
            lines.push(current.to_string());
            continue;
        }
        if let Some(line) = line.filter(|_| !placed) {
            lines.push(line.to_string());
            placed = true;
        }
    }
    if let Some(line) = line.filter(|_| !placed) {
        lines.push(line.to_string());
    }

    debug!("Updating {:?}", path);
    atomic_write(path, &join_lines(&lines))?;
    Ok(())
}

/// Set or remove `KEY=value` assignments in a shell variable file.
pub fn set_shell_vars(path: &Path, vars: &[(&str, Option<&str>)]) -> Result<()> {
    for (key, value) in vars {
        let prefix = format!("{key}=");
        let line = value.map(|value| format!("{key}={}", shell_quote(value)));
        replace_lines(
            path,
            |current| current.trim_start().starts_with(&prefix),
            line.as_deref(),
        )?;
    }
    Ok(())
}

/// Set or remove an `export KEY=value` line, as found in `/etc/profile`.
pub fn set_export(path: &Path, key: &str, value: Option<&str>) -> Result<()> {
    let prefix = format!("export {key}=");
    let line = value.map(|value| format!("{prefix}{}", shell_quote(value)));
    replace_lines(
        path,
        |current| current.trim_start().starts_with(&prefix),
        line.as_deref(),
    )
}

/// Double quote values the shell would split.
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || "\"'$`\\;#".contains(c)) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        lines.join("\n") + "\n"
    }
}
