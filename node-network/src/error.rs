// SPDX-License-Identifier: GPL-3.0-only

use node_config::ConfigError;
use node_sys::SysError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error(transparent)]
    Sys(#[from] SysError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("bond slave {device} can not be used as primary device")]
    SlaveIsPrimary { device: String },

    #[error("bond {bond} is configured but not used as the primary device")]
    UnreferencedBond { bond: String },
}

pub type Result<T> = std::result::Result<T, NetworkError>;
