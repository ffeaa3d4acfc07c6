// SPDX-License-Identifier: GPL-3.0-only

//! The flat `KEY="VALUE"` settings file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use node_sys::fs::{atomic_write, read_optional};
use tracing::{debug, warn};

use crate::section::{ConfigSection, Fields};
use crate::{ConfigError, Result};

pub const DEFAULTS_FILE: &str = "/etc/default/ovirt";

/// Durable key/value settings store.
///
/// The file is the only source of truth: every read parses it again and
/// every write replaces it as a whole.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULTS_FILE)
    }
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Current content; a missing file reads as empty.
    pub fn load(&self) -> Result<BTreeMap<String, String>> {
        let content = read_optional(&self.path)?.unwrap_or_default();
        Ok(parse(&content))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    /// Merge `values` into the file.
    ///
    /// With `remove_empty`, keys mapped to `None` are deleted; otherwise
    /// they are written as empty strings.
    pub fn update<I, K>(&self, values: I, remove_empty: bool) -> Result<()>
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        let mut current = self.load()?;
        for (key, value) in values {
            let key = key.into();
            match value {
                Some(value) => {
                    current.insert(key, value);
                }
                None if remove_empty => {
                    current.remove(&key);
                }
                None => {
                    current.insert(key, String::new());
                }
            }
        }
        debug!("Writing {} settings to {:?}", current.len(), self.path);
        atomic_write(&self.path, &render(&current))?;
        Ok(())
    }

    /// Replace the whole file with `values`.
    pub fn replace(&self, values: &BTreeMap<String, String>) -> Result<()> {
        debug!("Replacing {:?} with {} settings", self.path, values.len());
        atomic_write(&self.path, &render(values))?;
        Ok(())
    }

    /// Validate a section and write all of its keys.
    pub fn update_section<S: ConfigSection>(&self, section: &S) -> Result<()> {
        section.validate()?;
        let values = checked_values::<S>(section.encode())?;
        self.update(S::KEYS.iter().copied().zip(values), true)
    }

    /// Read a section back; absent keys decode to the section's absent value.
    pub fn retrieve_section<S: ConfigSection>(&self) -> Result<S> {
        let current = self.load()?;
        let values: Vec<Option<String>> = S::KEYS
            .iter()
            .map(|key| current.get(*key).filter(|v| !v.is_empty()).cloned())
            .collect();
        Ok(S::decode(&mut Fields::new(values)))
    }

    /// Remove `keys`, or every key of the section when `None`.
    pub fn clear_section<S: ConfigSection>(&self, keys: Option<&[&str]>) -> Result<()> {
        let keys = keys.unwrap_or(S::KEYS);
        self.update(keys.iter().map(|key| (*key, None)), true)
    }

    /// Read, modify and write a section in one go; fields the closure does
    /// not touch keep their stored values.
    pub fn modify_section<S, F>(&self, modify: F) -> Result<S>
    where
        S: ConfigSection + Clone,
        F: FnOnce(&mut S),
    {
        let mut section = self.retrieve_section::<S>()?;
        modify(&mut section);
        self.update_section(&section)?;
        Ok(section)
    }
}

fn checked_values<S: ConfigSection>(values: Vec<Option<String>>) -> Result<Vec<Option<String>>> {
    if values.len() != S::KEYS.len() {
        return Err(ConfigError::SectionArity {
            section: S::NAME,
            expected: S::KEYS.len(),
            actual: values.len(),
        });
    }
    Ok(values
        .into_iter()
        .map(|value| value.filter(|v| !v.is_empty()))
        .collect())
}

/// Parse `KEY=VALUE` lines. Comments and blank lines are ignored,
/// malformed lines are skipped with a warning.
pub fn parse(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("Skipping malformed settings line {}: {:?}", number + 1, line);
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            warn!("Skipping malformed settings line {}: {:?}", number + 1, line);
            continue;
        }

        values.insert(key.to_string(), unquote(value.trim()));
    }

    values
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut output = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    output.push(next);
                }
            } else {
                output.push(c);
            }
        }
        output
    } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Sorted `KEY="VALUE"` lines.
pub fn render(values: &BTreeMap<String, String>) -> String {
    let mut output = String::new();
    for (key, value) in values {
        let escaped: String = value
            .chars()
            .flat_map(|c| match c {
                '"' | '\\' | '$' | '`' => vec!['\\', c],
                _ => vec![c],
            })
            .collect();
        output.push_str(&format!("{key}=\"{escaped}\"\n"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shell_var_syntax() {
        let values = parse(
            "# managed by ovirt\n\
             OVIRT_INIT=\"/dev/sda,/dev/sdb\"\n\
             OVIRT_OVERCOMMIT='0.5'\n\
             \n  OVIRT_HOSTNAME = node1  \n\
             this is not a setting\n\
             OVIRT_BAD-KEY=1\n\
             OVIRT_QUOTED=\"a \\\"b\\\"\"\n",
        );
        assert_eq!(values.len(), 4);
        assert_eq!(values["OVIRT_INIT"], "/dev/sda,/dev/sdb");
        assert_eq!(values["OVIRT_OVERCOMMIT"], "0.5");
        assert_eq!(values["OVIRT_HOSTNAME"], "node1");
        assert_eq!(values["OVIRT_QUOTED"], "a \"b\"");
    }

    #[test]
    fn renders_sorted_quoted_lines() {
        let values = BTreeMap::from([
            ("OVIRT_B".to_string(), "2".to_string()),
            ("OVIRT_A".to_string(), "say \"hi\"".to_string()),
        ]);
        let text = render(&values);
        assert_eq!(text, "OVIRT_A=\"say \\\"hi\\\"\"\nOVIRT_B=\"2\"\n");
        assert_eq!(parse(&text), values);
    }

    #[test]
    fn update_removes_absent_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("ovirt"));
        store
            .update(
                [
                    ("OVIRT_A", Some("1".to_string())),
                    ("OVIRT_B", Some("2".to_string())),
                ],
                true,
            )
            .unwrap();
        store.update([("OVIRT_A", None)], true).unwrap();
        assert_eq!(store.get("OVIRT_A").unwrap(), None);
        assert_eq!(store.get("OVIRT_B").unwrap().as_deref(), Some("2"));

        store.update([("OVIRT_B", None)], false).unwrap();
        assert_eq!(store.get("OVIRT_B").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn replace_restores_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("ovirt"));
        store
            .update([("OVIRT_HOSTNAME", Some("node".to_string()))], true)
            .unwrap();
        let saved = store.load().unwrap();

        store
            .update(
                [
                    ("OVIRT_HOSTNAME", Some("other".to_string())),
                    ("OVIRT_DNS", Some("10.0.0.2".to_string())),
                ],
                true,
            )
            .unwrap();
        store.replace(&saved).unwrap();
        assert_eq!(store.load().unwrap(), saved);
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent"));
        assert!(store.load().unwrap().is_empty());
        assert!(!store.exists());
    }
}
