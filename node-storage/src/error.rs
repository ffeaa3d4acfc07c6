// SPDX-License-Identifier: GPL-3.0-only

use node_config::ConfigError;
use node_sys::SysError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Sys(#[from] SysError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no storage device selected")]
    NoDeviceSelected,

    #[error("{0} is required")]
    MissingSetting(String),

    #[error("invalid value for {key}: '{value}'")]
    InvalidSetting { key: String, value: String },

    #[error("{field} is smaller than the minimum required size of {minimum}MB (got {value}MB)")]
    BelowMinimum {
        field: String,
        value: i64,
        minimum: i64,
    },

    #[error("missing device parameter for AppVG: OVIRT_INIT_APP is required for Swap2/Data2")]
    MissingAppVgDevice,

    #[error("devices are members of both HostVG and AppVG: {}", devices.join(", "))]
    VolumeGroupOverlap { devices: Vec<String> },

    #[error(
        "an existing {vg} installation was found on {}; manual cleanup of the storage is required",
        devices.join(", ")
    )]
    ExistingInstallation { vg: String, devices: Vec<String> },

    #[error(
        "the target storage device is too small: {target} has {available}MB, {needed}MB needed; an additional {gap}MB of storage is needed on {device}"
    )]
    InsufficientSpace {
        target: String,
        device: String,
        available: u64,
        needed: u64,
        gap: u64,
    },

    #[error("fakeraid metadata detected on {device}; boot with the wipe-fakeraid option to remove it")]
    Fakeraid { device: String },

    #[error("partition {number} on {disk} did not appear")]
    PartitionNotFound { disk: String, number: u32 },

    #[error("timed out waiting for {device}")]
    DeviceNotReady { device: String },

    #[error("{volume} has not been created")]
    VolumeMissing { volume: String },

    #[error("{mount_point} could not be mounted")]
    MountFailed { mount_point: String },
}

impl StorageError {
    pub(crate) fn insufficient(target: &str, device: &str, available: u64, needed: u64) -> Self {
        Self::InsufficientSpace {
            target: target.to_string(),
            device: device.to_string(),
            available,
            needed,
            gap: needed.saturating_sub(available),
        }
    }

    /// Whether the error was raised before anything on disk changed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoDeviceSelected
                | Self::MissingSetting(_)
                | Self::InvalidSetting { .. }
                | Self::BelowMinimum { .. }
                | Self::MissingAppVgDevice
                | Self::VolumeGroupOverlap { .. }
                | Self::ExistingInstallation { .. }
                | Self::InsufficientSpace { .. }
                | Self::Fakeraid { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
