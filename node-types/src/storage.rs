// SPDX-License-Identifier: GPL-3.0-only

//! Storage layout types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// Partition table label written by `parted mklabel`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    #[default]
    Gpt,
    Msdos,
}

impl PartitionTableType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gpt => "gpt",
            Self::Msdos => "msdos",
        }
    }
}

impl FromStr for PartitionTableType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gpt" => Ok(Self::Gpt),
            "msdos" | "dos" => Ok(Self::Msdos),
            _ => Err(UnknownVariant::new("partition table type", value)),
        }
    }
}

impl fmt::Display for PartitionTableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size request for a logical volume
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LvSize {
    /// Fixed size in MB (0 means the volume is not created)
    Megabytes(u64),
    /// Consume all remaining free extents of the volume group (`-1`)
    RemainingFree,
}

impl LvSize {
    /// Interpret a settings value where `-1` is the "rest of the group" sentinel.
    pub fn from_setting(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Self::RemainingFree),
            v if v >= 0 => Some(Self::Megabytes(v as u64)),
            _ => None,
        }
    }

    pub fn as_setting(self) -> i64 {
        match self {
            Self::Megabytes(mb) => mb as i64,
            Self::RemainingFree => -1,
        }
    }

    /// Whether an LV is created for this request at all
    pub fn is_requested(self) -> bool {
        !matches!(self, Self::Megabytes(0))
    }
}

/// Volume groups owned by the node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VolumeGroup {
    HostVg,
    AppVg,
}

impl VolumeGroup {
    pub fn name(self) -> &'static str {
        match self {
            Self::HostVg => "HostVG",
            Self::AppVg => "AppVG",
        }
    }
}

impl fmt::Display for VolumeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Partition and volume sizes in MB for one provisioning run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeSizes {
    pub boot: u64,
    pub root: u64,
    pub efi: u64,
    pub swap: u64,
    pub config: u64,
    pub logging: u64,
    pub data: LvSize,
    pub swap2: u64,
    pub data2: LvSize,
}

impl Default for VolumeSizes {
    fn default() -> Self {
        Self {
            boot: 512,
            root: 512,
            efi: 256,
            swap: 0,
            config: 5,
            logging: 2048,
            data: LvSize::RemainingFree,
            swap2: 0,
            data2: LvSize::Megabytes(0),
        }
    }
}

impl VolumeSizes {
    /// End offset of the Root partition, which follows EFI/bios_grub.
    pub fn root_end(&self) -> u64 {
        self.efi + self.root
    }

    pub fn root_backup_end(&self) -> u64 {
        self.root * 2 + self.efi
    }

    pub fn boot_end(&self) -> u64 {
        self.efi + self.boot
    }

    pub fn boot_backup_end(&self) -> u64 {
        self.efi + self.boot * 2
    }

    /// Space the root drive needs for EFI, Root and RootBackup.
    pub fn root_need(&self) -> u64 {
        self.root_backup_end()
    }

    /// Space HostVG needs; a `-1` data request counts as 5 MB.
    pub fn hostvg_need(&self) -> u64 {
        let data = match self.data {
            LvSize::Megabytes(mb) => mb,
            LvSize::RemainingFree => 5,
        };
        self.swap + self.config + self.logging + data
    }

    pub fn wants_appvg(&self) -> bool {
        self.swap2 > 0 || self.data2.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lv_size_sentinel() {
        assert_eq!(LvSize::from_setting(-1), Some(LvSize::RemainingFree));
        assert_eq!(LvSize::from_setting(2048), Some(LvSize::Megabytes(2048)));
        assert_eq!(LvSize::from_setting(-5), None);
        assert!(!LvSize::Megabytes(0).is_requested());
        assert!(LvSize::RemainingFree.is_requested());
    }

    #[test]
    fn partition_offsets_follow_each_other() {
        let sizes = VolumeSizes::default();
        assert_eq!(sizes.root_end(), 768);
        assert_eq!(sizes.root_backup_end(), 1280);
        assert_eq!(sizes.boot_backup_end(), 1280);
        assert_eq!(sizes.hostvg_need(), 2058);
        assert!(!sizes.wants_appvg());
    }

    #[test]
    fn parses_table_types() {
        assert_eq!("GPT".parse::<PartitionTableType>(), Ok(PartitionTableType::Gpt));
        assert_eq!(
            "dos".parse::<PartitionTableType>(),
            Ok(PartitionTableType::Msdos)
        );
        assert!("loop".parse::<PartitionTableType>().is_err());
    }
}
