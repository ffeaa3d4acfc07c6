// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use node_config::ConfigError;
use node_network::NetworkError;
use node_storage::StorageError;
use node_sys::SysError;
use node_transaction::TransactionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Sys(#[from] SysError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("unknown page: {0}")]
    UnknownPage(String),

    #[error("required pages are missing: {}", .0.join(", "))]
    MissingPages(Vec<String>),

    #[error("page {0} is registered twice")]
    DuplicatePage(String),

    #[error("{key} is not a setting of page {page}")]
    UnknownKey { page: String, key: String },

    #[error("page {0} is read-only")]
    ReadOnly(String),

    #[error("page {page} is locked by {managed_by}")]
    Locked { page: String, managed_by: String },

    #[error("{0}")]
    Failed(String),

    #[error("invalid settings file {path:?}: {reason}")]
    Settings { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, SetupError>;
