// SPDX-License-Identifier: GPL-3.0-only

//! Runtime paths of the setup tool
//!
//! Read from a TOML file; every field is optional and falls back to the
//! paths of an installed node.

use std::fs;
use std::path::{Path, PathBuf};

use node_config::DEFAULTS_FILE;
use node_sys::PersistPaths;
use node_transaction::DEFAULT_LOCK_FILE;
use serde::{Deserialize, Serialize};

use crate::{Result, SetupError};

pub const SETTINGS_FILE: &str = "/etc/ovirt-node/setup.toml";
pub const DEFAULT_LOG_FILE: &str = "/var/log/ovirt-node/ovirt-node-setup.log";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodePaths {
    /// Root of the filesystem whose configuration files, sysfs and device
    /// nodes are edited and inspected. The paths below are used as given.
    pub root: PathBuf,
    pub defaults_file: PathBuf,
    pub config_base: PathBuf,
    pub manifest: PathBuf,
    pub mountinfo: PathBuf,
    pub lock_file: PathBuf,
    /// `None` disables the log file
    pub log_file: Option<PathBuf>,
    pub log_level: LoggingLevel,
}

impl Default for NodePaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            defaults_file: PathBuf::from(DEFAULTS_FILE),
            config_base: PathBuf::from("/config"),
            manifest: PathBuf::from("/config/files"),
            mountinfo: PathBuf::from("/proc/self/mountinfo"),
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            log_level: LoggingLevel::Info,
        }
    }
}

impl NodePaths {
    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SetupError::Settings {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };
        Self::parse(path, &raw)
    }

    pub fn parse(path: &Path, raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| SetupError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn persist_paths(&self) -> PersistPaths {
        PersistPaths {
            root: self.root.clone(),
            base: self.config_base.clone(),
            manifest: self.manifest.clone(),
            mountinfo: self.mountinfo.clone(),
        }
    }
}
