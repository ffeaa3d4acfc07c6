// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on {path:?}: {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed: {command}; stderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("unexpected output from {command}: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error(
        "the volume group \"{vg}\" spans multiple disks ({outside}); manual cleanup required"
    )]
    VolumeGroupSpansDisks { vg: String, outside: String },

    #[error("invalid mountinfo line: {0}")]
    InvalidMountInfoLine(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl SysError {
    pub(crate) fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
