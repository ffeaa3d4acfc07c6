// SPDX-License-Identifier: GPL-3.0-only

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::{Result, TransactionError};

pub const DEFAULT_LOCK_FILE: &str = "/tmp/transaction-in-progress";

/// System wide advisory lock serializing transaction runs
#[derive(Debug, Clone)]
pub struct TransactionLock {
    path: PathBuf,
}

impl Default for TransactionLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_FILE)
    }
}

impl TransactionLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without blocking.
    pub fn acquire(&self) -> Result<LockGuard> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|e| TransactionError::Lock {
                lockfile: self.path.clone(),
                reason: e.to_string(),
            })?;

        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            if errno == Errno::EWOULDBLOCK {
                TransactionError::AlreadyRunning {
                    lockfile: self.path.clone(),
                }
            } else {
                TransactionError::Lock {
                    lockfile: self.path.clone(),
                    reason: errno.desc().to_string(),
                }
            }
        })?;

        debug!("Acquired transaction lock {:?}", self.path);
        Ok(LockGuard {
            _lock: lock,
            path: self.path.clone(),
        })
    }
}

/// Held lock; released on drop.
pub struct LockGuard {
    _lock: Flock<File>,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!("Released transaction lock {:?}", self.path);
    }
}
