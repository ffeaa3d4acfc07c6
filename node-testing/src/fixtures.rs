// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A throwaway filesystem root.
///
/// Paths are given in their absolute on-host spelling (`/etc/fstab`) and
/// mapped below the temporary directory.
pub struct NodeRoot {
    dir: TempDir,
}

impl NodeRoot {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, absolute: &str) -> PathBuf {
        self.dir.path().join(absolute.trim_start_matches('/'))
    }

    pub fn write(&self, absolute: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.path(absolute);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Content of a file, or an empty string when it does not exist.
    pub fn read(&self, absolute: &str) -> String {
        fs::read_to_string(self.path(absolute)).unwrap_or_default()
    }

    pub fn exists(&self, absolute: &str) -> bool {
        self.path(absolute).exists()
    }

    pub fn mkdir(&self, absolute: &str) -> std::io::Result<PathBuf> {
        let path = self.path(absolute);
        fs::create_dir_all(&path)?;
        Ok(path)
    }
}
