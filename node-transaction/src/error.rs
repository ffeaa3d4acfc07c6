// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error raised by an individual step
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

pub type StepResult = std::result::Result<(), StepError>;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction '{title}' failed: {message}")]
    Failed { title: String, message: String },

    #[error("a transaction is already running (lock held on {lockfile:?})")]
    AlreadyRunning { lockfile: PathBuf },

    #[error("cannot lock {lockfile:?}: {reason}")]
    Lock { lockfile: PathBuf, reason: String },
}

impl TransactionError {
    pub(crate) fn failed(title: &str, source: &StepError) -> Self {
        Self::Failed {
            title: title.to_string(),
            message: source.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransactionError>;
