// SPDX-License-Identifier: GPL-3.0-only

//! Storage plan derived from the settings store
//!
//! The plan is computed once per provisioning run and never persisted. All
//! device paths in it are already canonicalized, so two spellings of the
//! same disk compare equal.

use std::collections::BTreeMap;

use node_config::ConfigStore;
use node_sys::DeviceCatalog;
use node_types::{LvSize, PartitionTableType, VolumeSizes};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::swap::calculate_swap_size;
use crate::{Result, StorageError};

pub const DEFAULT_OVERCOMMIT: f64 = 0.5;
pub const DEFAULT_ISCSI_PORT: &str = "3260";
const MIN_SWAP_SIZE: i64 = 5;
const MIN_LOGGING_SIZE: i64 = 5;

/// iSCSI target the root filesystem is installed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IscsiTarget {
    /// Initiator name to configure before logging in
    pub initiator: Option<String>,
    pub name: String,
    pub host: String,
    pub port: String,
    /// Device the target shows up as once logged in
    pub device: Option<String>,
}

impl IscsiTarget {
    pub fn portal(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoragePlan {
    pub root_drive: Option<String>,
    /// Separate boot drive, only used by iSCSI installs
    pub boot_drive: Option<String>,
    pub hostvg_drives: Vec<String>,
    pub appvg_drives: Vec<String>,
    pub sizes: VolumeSizes,
    pub label: PartitionTableType,
    pub overcommit: f64,
    /// Set for iSCSI installs
    pub iscsi: Option<IscsiTarget>,
    /// Partition the root drive (`OVIRT_ROOT_INSTALL=y`)
    pub root_install: bool,
    /// Sync GPT to a legacy MBR after partitioning (`OVIRT_INSTALL_ROOT=y`)
    pub install_root: bool,
    pub crypt_swap: Option<String>,
    pub crypt_swap2: Option<String>,
    pub wipe_fakeraid: bool,
}

impl StoragePlan {
    /// Build a plan from the current content of `store`.
    pub fn from_store(store: &ConfigStore, catalog: &DeviceCatalog<'_>, mem_mb: u64) -> Result<Self> {
        let settings = store.load()?;
        Self::from_settings(&settings, |dev| catalog.canonicalize(dev), mem_mb)
    }

    /// Build a plan from raw settings.
    ///
    /// `canonicalize` maps user supplied device paths to their canonical
    /// spelling; `mem_mb` is used for the swap size when none is configured.
    pub fn from_settings<F>(
        settings: &BTreeMap<String, String>,
        canonicalize: F,
        mem_mb: u64,
    ) -> Result<Self>
    where
        F: Fn(&str) -> String,
    {
        let get = |key: &str| {
            settings
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let overcommit = match get("OVIRT_OVERCOMMIT") {
            Some(value) => value
                .parse::<f64>()
                .ok()
                .filter(|v| *v >= 0.0)
                .ok_or_else(|| invalid("OVIRT_OVERCOMMIT", value))?,
            None => DEFAULT_OVERCOMMIT,
        };

        let defaults = VolumeSizes::default();
        let swap = match get("OVIRT_VOL_SWAP_SIZE") {
            Some(value) => size_value("OVIRT_VOL_SWAP_SIZE", value, MIN_SWAP_SIZE)? as u64,
            None => {
                let swap = calculate_swap_size(mem_mb, overcommit);
                debug!("Computed swap size {}MB for {}MB RAM", swap, mem_mb);
                swap
            }
        };
        let size = |key: &str, default: u64, minimum: i64| -> Result<u64> {
            match get(key) {
                Some(value) => Ok(size_value(key, value, minimum)? as u64),
                None => {
                    debug!("Using default value for {}: {}", key, default);
                    Ok(default)
                }
            }
        };
        let lv_size = |key: &str, default: LvSize| -> Result<LvSize> {
            match get(key) {
                Some(value) => {
                    let parsed = size_value(key, value, -1)?;
                    LvSize::from_setting(parsed).ok_or_else(|| invalid(key, value))
                }
                None => Ok(default),
            }
        };

        let sizes = VolumeSizes {
            boot: size("OVIRT_VOL_BOOT_SIZE", defaults.boot, defaults.boot as i64)?,
            root: size("OVIRT_VOL_ROOT_SIZE", defaults.root, defaults.root as i64)?,
            efi: size("OVIRT_VOL_EFI_SIZE", defaults.efi, defaults.efi as i64)?,
            swap,
            config: size("OVIRT_VOL_CONFIG_SIZE", defaults.config, defaults.config as i64)?,
            logging: size("OVIRT_VOL_LOGGING_SIZE", defaults.logging, MIN_LOGGING_SIZE)?,
            data: lv_size("OVIRT_VOL_DATA_SIZE", defaults.data)?,
            swap2: size("OVIRT_VOL_SWAP2_SIZE", defaults.swap2, 0)?,
            data2: lv_size("OVIRT_VOL_DATA2_SIZE", defaults.data2)?,
        };

        let init: Vec<String> = get("OVIRT_INIT")
            .map(|value| split_devices(value, &canonicalize))
            .unwrap_or_default();
        let root_drive = init.first().cloned();
        let hostvg_drives = match init.as_slice() {
            [] => Vec::new(),
            [only] => vec![only.clone()],
            [_, rest @ ..] => {
                let mut drives: Vec<String> = Vec::new();
                for drive in rest {
                    if !drives.contains(drive) {
                        drives.push(drive.clone());
                    }
                }
                drives
            }
        };

        let iscsi_install = get("OVIRT_ISCSI_INSTALL").is_some_and(|v| v.eq_ignore_ascii_case("y"));
        let iscsi = if iscsi_install {
            Some(IscsiTarget {
                initiator: get("OVIRT_ISCSI_NAME")
                    .or_else(|| get("OVIRT_ISCSI_NODE_NAME"))
                    .map(str::to_string),
                name: get("OVIRT_ISCSI_TARGET_NAME")
                    .ok_or_else(|| StorageError::MissingSetting("OVIRT_ISCSI_TARGET_NAME".into()))?
                    .to_string(),
                host: get("OVIRT_ISCSI_TARGET_HOST")
                    .or_else(|| get("OVIRT_ISCSI_TARGET_IP"))
                    .ok_or_else(|| StorageError::MissingSetting("OVIRT_ISCSI_TARGET_HOST".into()))?
                    .to_string(),
                port: get("OVIRT_ISCSI_TARGET_PORT")
                    .unwrap_or(DEFAULT_ISCSI_PORT)
                    .to_string(),
                device: get("OVIRT_ISCSI_INIT").map(str::to_string),
            })
        } else {
            None
        };
        let boot_drive = if iscsi_install { root_drive.clone() } else { None };

        let appvg_drives = if sizes.wants_appvg() {
            match get("OVIRT_INIT_APP") {
                Some(value) => split_devices(value, &canonicalize),
                None => return Err(StorageError::MissingAppVgDevice),
            }
        } else {
            if get("OVIRT_INIT_APP").is_some() {
                warn!("OVIRT_INIT_APP is set but neither Swap2 nor Data2 is requested");
            }
            Vec::new()
        };

        let plan = Self {
            root_drive,
            boot_drive,
            hostvg_drives,
            appvg_drives,
            sizes,
            label: PartitionTableType::Gpt,
            overcommit,
            iscsi,
            root_install: get("OVIRT_ROOT_INSTALL") == Some("y"),
            install_root: get("OVIRT_INSTALL_ROOT") == Some("y"),
            crypt_swap: get("OVIRT_CRYPT_SWAP").map(str::to_string),
            crypt_swap2: get("OVIRT_CRYPT_SWAP2").map(str::to_string),
            wipe_fakeraid: get("OVIRT_WIPE_FAKERAID") == Some("1"),
        };
        info!(
            "Storage plan: root {:?}, HostVG {:?}, AppVG {:?}",
            plan.root_drive, plan.hostvg_drives, plan.appvg_drives
        );
        Ok(plan)
    }

    pub fn is_iscsi_install(&self) -> bool {
        self.iscsi.is_some()
    }

    pub fn first_hostvg_drive(&self) -> Option<&str> {
        self.hostvg_drives.first().map(String::as_str)
    }

    /// Devices in both the HostVG (including the root drive) and AppVG lists.
    pub fn overlapping_devices(&self) -> Vec<String> {
        let mut hostvg = self.hostvg_drives.clone();
        hostvg.extend(self.root_drive.iter().cloned());
        self.appvg_drives
            .iter()
            .filter(|drive| hostvg.contains(drive))
            .cloned()
            .collect()
    }

    pub fn cross_check_host_app(&self) -> bool {
        let overlap = self.overlapping_devices();
        if !overlap.is_empty() {
            warn!("Drives are members of both AppVG and HostVG: {:?}", overlap);
        }
        overlap.is_empty()
    }

    /// HostVG, root and boot drives without duplicates.
    pub fn target_drives(&self) -> Vec<String> {
        let mut drives: Vec<String> = Vec::new();
        let candidates = self
            .hostvg_drives
            .iter()
            .chain(self.root_drive.iter())
            .chain(self.boot_drive.iter());
        for drive in candidates {
            if !drives.contains(drive) {
                drives.push(drive.clone());
            }
        }
        drives
    }
}

/// Whether HostVG and AppVG member lists are disjoint.
pub fn cross_check_host_app(hostvg: &[String], appvg: &[String]) -> bool {
    !appvg.iter().any(|drive| hostvg.contains(drive))
}

fn split_devices<F: Fn(&str) -> String>(value: &str, canonicalize: &F) -> Vec<String> {
    value
        .trim_matches(',')
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(canonicalize)
        .collect()
}

fn size_value(key: &str, value: &str, minimum: i64) -> Result<i64> {
    let parsed: i64 = value.parse().map_err(|_| invalid(key, value))?;
    if parsed < minimum {
        return Err(StorageError::BelowMinimum {
            field: key.to_string(),
            value: parsed,
            minimum,
        });
    }
    Ok(parsed)
}

fn invalid(key: &str, value: &str) -> StorageError {
    StorageError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn mapped(dev: &str) -> String {
        match dev {
            "/dev/sdc" | "/dev/sdd" => "/dev/mapper/mpatha".to_string(),
            other => other.to_string(),
        }
    }

    #[test]
    fn single_disk_hosts_root_and_hostvg() {
        let plan = StoragePlan::from_settings(
            &settings(&[("OVIRT_INIT", "/dev/sda,"), ("OVIRT_VOL_SWAP_SIZE", "1024")]),
            mapped,
            4096,
        )
        .unwrap();

        assert_eq!(plan.root_drive.as_deref(), Some("/dev/sda"));
        assert_eq!(plan.hostvg_drives, vec!["/dev/sda"]);
        assert_eq!(plan.sizes.swap, 1024);
        assert_eq!(plan.sizes.data, LvSize::RemainingFree);
        assert!(plan.boot_drive.is_none());
    }

    #[test]
    fn extra_disks_form_hostvg_without_duplicates() {
        let plan = StoragePlan::from_settings(
            &settings(&[("OVIRT_INIT", "/dev/sda,/dev/sdc,/dev/sdd,/dev/sdb")]),
            mapped,
            32 * 1024,
        )
        .unwrap();

        assert_eq!(plan.root_drive.as_deref(), Some("/dev/sda"));
        assert_eq!(plan.hostvg_drives, vec!["/dev/mapper/mpatha", "/dev/sdb"]);
        assert_eq!(plan.sizes.swap, 24576);
    }

    #[test]
    fn sizes_below_minimum_name_the_field() {
        let err = StoragePlan::from_settings(
            &settings(&[("OVIRT_INIT", "/dev/sda"), ("OVIRT_VOL_SWAP_SIZE", "2")]),
            mapped,
            4096,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StorageError::BelowMinimum { ref field, minimum: 5, .. } if field == "OVIRT_VOL_SWAP_SIZE"
        ));

        let err = StoragePlan::from_settings(
            &settings(&[("OVIRT_INIT", "/dev/sda"), ("OVIRT_VOL_ROOT_SIZE", "100")]),
            mapped,
            4096,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "OVIRT_VOL_ROOT_SIZE is smaller than the minimum required size of 512MB (got 100MB)"
        );
    }

    #[test]
    fn appvg_needs_devices_when_requested() {
        let err = StoragePlan::from_settings(
            &settings(&[("OVIRT_INIT", "/dev/sda"), ("OVIRT_VOL_DATA2_SIZE", "-1")]),
            mapped,
            4096,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::MissingAppVgDevice));
    }

    #[test]
    fn overlap_is_detected_after_canonicalization() {
        let plan = StoragePlan::from_settings(
            &settings(&[
                ("OVIRT_INIT", "/dev/sda,/dev/sdc"),
                ("OVIRT_INIT_APP", "/dev/sdd"),
                ("OVIRT_VOL_SWAP2_SIZE", "1024"),
            ]),
            mapped,
            4096,
        )
        .unwrap();

        assert_eq!(plan.overlapping_devices(), vec!["/dev/mapper/mpatha"]);
        assert!(!plan.cross_check_host_app());
        assert!(cross_check_host_app(
            &["/dev/sda".to_string()],
            &["/dev/sdb".to_string()]
        ));
        assert!(cross_check_host_app(&[], &[]));
    }

    #[test]
    fn iscsi_install_boots_from_the_root_drive() {
        let plan = StoragePlan::from_settings(
            &settings(&[
                ("OVIRT_INIT", "/dev/sda"),
                ("OVIRT_ISCSI_INSTALL", "Y"),
                ("OVIRT_ISCSI_TARGET_NAME", "iqn.2010-01.com.example:root"),
                ("OVIRT_ISCSI_TARGET_HOST", "10.0.0.8"),
                ("OVIRT_ISCSI_INIT", "/dev/sdb"),
            ]),
            mapped,
            4096,
        )
        .unwrap();

        assert_eq!(plan.boot_drive.as_deref(), Some("/dev/sda"));
        let target = plan.iscsi.unwrap();
        assert_eq!(target.portal(), "10.0.0.8:3260");
        assert_eq!(target.device.as_deref(), Some("/dev/sdb"));
    }

    #[test]
    fn iscsi_install_requires_a_target() {
        let err = StoragePlan::from_settings(
            &settings(&[("OVIRT_INIT", "/dev/sda"), ("OVIRT_ISCSI_INSTALL", "y")]),
            mapped,
            4096,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "OVIRT_ISCSI_TARGET_NAME is required");
    }
}
