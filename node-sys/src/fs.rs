// SPDX-License-Identifier: GPL-3.0-only

//! File helpers: atomic replacement, line appends and backups

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Result, SysError};

/// Replace `path` with `content` via a sibling temp file and rename.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SysError::path_io(parent, e))?;
    }

    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, content).map_err(|e| SysError::path_io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| SysError::path_io(path, e))?;
    Ok(())
}

pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SysError::path_io(path, e)),
    }
}

/// Append `line` unless the file already contains it verbatim.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    let existing = read_optional(path)?.unwrap_or_default();
    if existing.lines().any(|l| l == line) {
        debug!("{:?} already contains {:?}", path, line);
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SysError::path_io(path, e))?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(file).map_err(|e| SysError::path_io(path, e))?;
    }
    writeln!(file, "{line}").map_err(|e| SysError::path_io(path, e))?;
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Backup copies (`<file>.backup`) of a set of files.
///
/// Files that do not exist when the backup is taken are remembered as
/// absent, and restoring removes whatever was created in their place.
#[derive(Debug, Clone)]
pub struct BackupFiles {
    files: Vec<PathBuf>,
    absent: Vec<PathBuf>,
}

impl BackupFiles {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            absent: Vec::new(),
        }
    }

    pub fn backup_path(file: &Path) -> PathBuf {
        sibling(file, ".backup")
    }

    pub fn create(&mut self) -> Result<()> {
        self.absent.clear();
        for file in &self.files {
            if file.exists() {
                let backup = Self::backup_path(file);
                fs::copy(file, &backup).map_err(|e| SysError::path_io(&backup, e))?;
                debug!("Backed up {:?}", file);
            } else {
                self.absent.push(file.clone());
            }
        }
        Ok(())
    }

    pub fn restore(&self) -> Result<()> {
        for file in &self.files {
            if self.absent.contains(file) {
                if file.exists() {
                    fs::remove_file(file).map_err(|e| SysError::path_io(file, e))?;
                }
                continue;
            }
            let backup = Self::backup_path(file);
            if backup.exists() {
                fs::copy(&backup, file).map_err(|e| SysError::path_io(file, e))?;
                debug!("Restored {:?}", file);
            }
        }
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        for file in &self.files {
            let backup = Self::backup_path(file);
            if backup.exists() {
                fs::remove_file(&backup).map_err(|e| SysError::path_io(&backup, e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/hostname");
        atomic_write(&path, "node1\n").unwrap();
        atomic_write(&path, "node2\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "node2\n");
        assert!(!sibling(&path, ".tmp").exists());
    }

    #[test]
    fn append_line_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        fs::write(&path, "proc /proc proc defaults 0 0").unwrap();
        append_line(&path, "/dev/HostVG/Swap swap swap defaults 0 0").unwrap();
        append_line(&path, "/dev/HostVG/Swap swap swap defaults 0 0").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "proc /proc proc defaults 0 0\n/dev/HostVG/Swap swap swap defaults 0 0\n"
        );
    }

    #[test]
    fn backups_restore_original_content() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("kdump.conf");
        let missing = dir.path().join("new.conf");
        fs::write(&existing, "path /var/crash\n").unwrap();

        let mut backups = BackupFiles::new([existing.clone(), missing.clone()]);
        backups.create().unwrap();
        fs::write(&existing, "nfs host:/crash\n").unwrap();
        fs::write(&missing, "created\n").unwrap();

        backups.restore().unwrap();
        assert_eq!(fs::read_to_string(&existing).unwrap(), "path /var/crash\n");
        assert!(!missing.exists());

        backups.remove().unwrap();
        assert!(!BackupFiles::backup_path(&existing).exists());
    }
}
