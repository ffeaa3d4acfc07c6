// SPDX-License-Identifier: GPL-3.0-only

//! HostVG and AppVG volumes, their fstab/crypttab records and mounts

use std::path::Path;

use node_sys::fs::append_line;
use node_types::{LvSize, PartitionTableType, VolumeGroup};
use tracing::{debug, info, warn};

use crate::plan::StoragePlan;
use crate::provisioner::{StorageProvisioner, mb};
use crate::{Result, StorageError};

const LOGGING_STAGING_DIR: &str = "/tmp/ovirt-logging";
const APPVG_PARTED_ATTEMPTS: u32 = 3;

fn lv_path(vg: VolumeGroup, name: &str) -> String {
    format!("/dev/{}/{}", vg.name(), name)
}

impl StorageProvisioner<'_> {
    /// Partition the HostVG drives, build the group and its volumes.
    pub(crate) fn create_hostvg(&self, plan: &StoragePlan, iscsi_drive: Option<&str>) -> Result<()> {
        info!("Creating LVM partition(s) for HostVG");
        let sizes = &plan.sizes;
        let label = plan.label.as_str();
        let root = plan.root_drive.as_deref();
        let boot = plan.boot_drive.as_deref();

        let mut partitions = Vec::new();
        for drive in &plan.hostvg_drives {
            let drive = drive.as_str();
            let number = if Some(drive) == root && iscsi_drive.is_none() {
                self.reread_partitions(drive)?;
                self.parted(
                    drive,
                    &["mkpart", "primary", "ext2", &mb(sizes.root_backup_end()), "-1"],
                )?;
                4
            } else if Some(drive) == boot {
                self.parted(
                    drive,
                    &["mkpart", "primary", "ext2", &mb(sizes.boot_backup_end()), "-1"],
                )?;
                4
            } else if Some(drive) == iscsi_drive {
                self.parted(
                    drive,
                    &["mkpart", "primary", "ext2", &mb(sizes.root * 2), "-1"],
                )?;
                3
            } else {
                self.reread_partitions(drive)?;
                self.parted(drive, &["mklabel", label])?;
                self.parted(drive, &["mkpart", "primary", "ext2", "1M", "-1"])?;
                1
            };

            info!("Toggling LVM on {} partition {}", drive, number);
            self.parted(drive, &["set", &number.to_string(), "lvm", "on"])?;
            self.try_run("parted", &["-s", drive, "print"]);
            self.try_run("udevadm", &["settle"]);
            if plan.install_root && plan.label == PartitionTableType::Gpt {
                if let Some(root) = root.or(boot) {
                    self.try_run("gptsync", &[root]);
                }
            }
            partitions.push((drive, number));
        }

        for (index, (drive, number)) in partitions.iter().enumerate() {
            for other in &plan.hostvg_drives {
                self.reread_partitions(other)?;
            }
            let part = self.wait_for_partition(drive, *number)?;
            info!("Creating physical volume on {}", part);
            self.prepare_physical_volume(&part)?;
            self.add_to_volume_group(VolumeGroup::HostVg, &part, index == 0)?;
        }

        self.create_hostvg_volumes(plan)?;

        self.mount_config()?;
        if self.persist.is_enabled() {
            self.persist_file("/etc/fstab");
        }
        if sizes.logging > 0 {
            self.unmount_logging();
            self.mount_logging()?;
        }
        if sizes.data.is_requested() {
            self.mount_data()?;
        }
        Ok(())
    }

    fn create_hostvg_volumes(&self, plan: &StoragePlan) -> Result<()> {
        let sizes = &plan.sizes;
        let vg = VolumeGroup::HostVg;

        if let Some(swap) = self.create_volume(vg, "Swap", LvSize::Megabytes(sizes.swap))? {
            self.run("mkswap", &["-L", "SWAP", &swap])?;
            self.append_fstab(&format!("{swap} swap swap defaults 0 0"))?;
            if let Some(options) = &plan.crypt_swap {
                self.append_crypttab(&format!(
                    "SWAP {swap} /dev/mapper/ovirt-crypt-swap {options}"
                ))?;
            }
        }

        if let Some(config) = self.create_volume(vg, "Config", LvSize::Megabytes(sizes.config))? {
            self.format_ext4(&config, "CONFIG")?;
        }

        if let Some(logging) = self.create_volume(vg, "Logging", LvSize::Megabytes(sizes.logging))? {
            self.format_ext4(&logging, "LOGGING")?;
            self.append_fstab(&format!("{logging} /var/log ext4 defaults,noatime 0 0"))?;
        }

        if let Some(data) = self.create_volume(vg, "Data", sizes.data)? {
            self.format_ext4(&data, "DATA")?;
            self.append_fstab(&format!("{data} /data ext4 defaults,noatime 0 0"))?;
            self.append_fstab("/data/images /var/lib/libvirt/images bind bind 0 0")?;
            self.append_fstab("/data/core /var/log/core bind bind 0 0")?;
        }
        Ok(())
    }

    /// Partition the AppVG drives, build the group, Swap2 and Data2.
    pub(crate) fn create_appvg(&self, plan: &StoragePlan) -> Result<()> {
        info!("Creating LVM partition(s) for AppVG");
        let sizes = &plan.sizes;
        let vg = VolumeGroup::AppVg;

        for (index, drive) in plan.appvg_drives.iter().enumerate() {
            self.wipe_partitions(drive);
            self.reread_partitions(drive)?;

            let mut part = None;
            for attempt in 1..=APPVG_PARTED_ATTEMPTS {
                let created = self.parted(
                    drive,
                    &[
                        "mklabel",
                        plan.label.as_str(),
                        "mkpart",
                        "primary",
                        "ext2",
                        "2048s",
                        "-1",
                        "set",
                        "1",
                        "lvm",
                        "on",
                        "print",
                    ],
                );
                self.reread_partitions(drive)?;
                if let Err(e) = created {
                    warn!("Partitioning {} failed (attempt {}): {}", drive, attempt, e);
                    continue;
                }
                part = self.partition_node(drive, 1);
                if part.is_some() {
                    break;
                }
            }
            let part = part.ok_or_else(|| StorageError::PartitionNotFound {
                disk: drive.clone(),
                number: 1,
            })?;

            self.prepare_physical_volume(&part)?;
            self.add_to_volume_group(vg, &part, index == 0)?;
        }

        if let Some(swap2) = self.create_volume(vg, "Swap2", LvSize::Megabytes(sizes.swap2))? {
            match &plan.crypt_swap2 {
                Some(options) => self.append_crypttab(&format!(
                    "SWAP2 {swap2} /dev/mapper/ovirt-crypt-swap2 {options}"
                ))?,
                None => {
                    self.run("mkswap", &["-L", "SWAP2", &swap2])?;
                    self.append_fstab(&format!("{swap2} swap swap defaults 0 0"))?;
                }
            }
        }

        if let Some(data2) = self.create_volume(vg, "Data2", sizes.data2)? {
            self.format_ext4(&data2, "DATA2")?;
            self.append_fstab(&format!("{data2} /data2 ext4 defaults,noatime 0 0"))?;
            self.mount_data2()?;
        }
        Ok(())
    }

    fn prepare_physical_volume(&self, part: &str) -> Result<()> {
        self.run("dd", &["if=/dev/zero", &format!("of={part}"), "bs=1024k", "count=1"])?;
        self.run("pvcreate", &["-ff", "-y", part])?;
        Ok(())
    }

    fn add_to_volume_group(&self, vg: VolumeGroup, part: &str, first: bool) -> Result<()> {
        let group = format!("/dev/{}", vg.name());
        if first {
            self.run("vgcreate", &[&group, part])
        } else {
            self.run("vgextend", &[&group, part])
        }
    }

    /// `lvcreate` for a requested size; `None` when nothing was requested.
    fn create_volume(&self, vg: VolumeGroup, name: &str, size: LvSize) -> Result<Option<String>> {
        let group = format!("/dev/{}", vg.name());
        match size {
            LvSize::Megabytes(0) => {
                debug!("No {} volume requested", name);
                return Ok(None);
            }
            LvSize::Megabytes(size) => {
                info!("Creating {} volume of {}MB", name, size);
                self.run("lvcreate", &["--name", name, "--size", &mb(size), &group])?;
            }
            LvSize::RemainingFree => {
                info!("Creating {} volume from the remaining space", name);
                self.run("lvcreate", &["--name", name, "-l", "100%FREE", &group])?;
            }
        }
        Ok(Some(lv_path(vg, name)))
    }

    fn format_ext4(&self, volume: &str, label: &str) -> Result<()> {
        self.run("mke2fs", &["-j", "-t", "ext4", volume, "-L", label])?;
        self.run("tune2fs", &["-c", "0", "-i", "0", volume])?;
        Ok(())
    }

    fn append_fstab(&self, line: &str) -> Result<()> {
        append_line(&self.paths.fstab(), line)?;
        Ok(())
    }

    fn append_crypttab(&self, line: &str) -> Result<()> {
        append_line(&self.paths.crypttab(), line)?;
        Ok(())
    }

    fn require_volume(&self, volume: &str) -> Result<()> {
        if self.runner.exists(Path::new(volume)) {
            return Ok(());
        }
        Err(StorageError::VolumeMissing {
            volume: volume.to_string(),
        })
    }

    fn mount(&self, args: &[&str], mount_point: &str) -> Result<()> {
        if self.try_run("mount", args) {
            return Ok(());
        }
        Err(StorageError::MountFailed {
            mount_point: mount_point.to_string(),
        })
    }

    /// Mount the Config volume over `/config` unless the overlay is live.
    pub(crate) fn mount_config(&self) -> Result<()> {
        let config = lv_path(VolumeGroup::HostVg, "Config");
        self.require_volume(&config)?;
        self.run("mkdir", &["-p", "/config"])?;
        if !self.persist.is_enabled() {
            self.mount(&[&config, "/config"], "/config")?;
        }
        if self.runner.exists(Path::new("/live/config")) {
            self.try_run("cp", &["-rv", "--update", "/live/config/.", "/config"]);
        }
        Ok(())
    }

    fn unmount_logging(&self) {
        if self.try_run("plymouth", &["--ping"]) {
            self.try_run("plymouth", &["--quit"]);
        }
        if !self.try_run("umount", &["/var/log"]) {
            debug!("/var/log was not mounted");
        }
    }

    /// Move the current logs onto the Logging volume and mount it on
    /// `/var/log`.
    pub(crate) fn mount_logging(&self) -> Result<()> {
        let logging = lv_path(VolumeGroup::HostVg, "Logging");
        self.require_volume(&logging)?;
        info!("Mounting log partition");
        self.run("mkdir", &["-p", LOGGING_STAGING_DIR])?;
        self.mount(&[&logging, LOGGING_STAGING_DIR], LOGGING_STAGING_DIR)?;
        self.try_run("cp", &["-a", "/var/log/.", LOGGING_STAGING_DIR]);
        self.mount(&["--move", LOGGING_STAGING_DIR, "/var/log"], "/var/log")?;
        self.try_run("restorecon", &["-r", "/var/log"]);
        self.try_run("service", &["rsyslog", "restart"]);
        Ok(())
    }

    pub(crate) fn mount_data(&self) -> Result<()> {
        let data = lv_path(VolumeGroup::HostVg, "Data");
        self.require_volume(&data)?;
        self.run("mkdir", &["-p", "/data"])?;
        self.mount(&["/data"], "/data")?;
        self.run("mkdir", &["-p", "/data/images/rhev"])?;
        self.try_run("chown", &["36:36", "/data/images/rhev"]);
        self.run("mkdir", &["-p", "/var/lib/libvirt/images"])?;
        self.mount(&["/var/lib/libvirt/images"], "/var/lib/libvirt/images")?;
        self.try_run("restorecon", &["-rv", "/var/lib/libvirt/images"]);
        self.run("mkdir", &["-p", "/data/core", "/var/log/core"])?;
        self.mount(&["/var/log/core"], "/var/log/core")?;
        self.try_run("restorecon", &["-rv", "/var/log/core"]);
        Ok(())
    }

    pub(crate) fn mount_data2(&self) -> Result<()> {
        let data2 = lv_path(VolumeGroup::AppVg, "Data2");
        self.require_volume(&data2)?;
        self.run("mkdir", &["-p", "/data2"])?;
        self.mount(&["/data2"], "/data2")
    }
}
