// SPDX-License-Identifier: GPL-3.0-only

//! Partitioning state machine
//!
//! `validate -> fakeraid -> wipe foreign LVM -> (iSCSI boot + root | root
//! drive) -> HostVG -> AppVG -> persist crypttab`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use node_config::ConfigStore;
use node_sys::devices::{self, partition_candidates};
use node_sys::fs::atomic_write;
use node_sys::{CommandRunner, CommandSpec, DeviceCatalog, LvmTools, PersistentStore};
use node_types::VolumeGroup;
use tracing::{debug, error, info, warn};

use crate::plan::{IscsiTarget, StoragePlan};
use crate::{Result, StorageError};

const PARTITION_WAIT_ATTEMPTS: u32 = 15;
const PARTITION_WAIT_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const BY_LABEL: &str = "/dev/disk/by-label";
const ISCSI_INITIATOR_FILE: &str = "/etc/iscsi/initiatorname.iscsi";

/// Files the provisioner writes, relative to a filesystem root
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn live(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    pub fn fstab(&self) -> PathBuf {
        self.live("/etc/fstab")
    }

    pub fn crypttab(&self) -> PathBuf {
        self.live("/etc/ovirt-crypttab")
    }

    pub fn iscsi_initiator(&self) -> PathBuf {
        self.live(ISCSI_INITIATOR_FILE)
    }

    fn efi_firmware(&self) -> PathBuf {
        self.live("/sys/firmware/efi")
    }
}

pub struct StorageProvisioner<'a> {
    pub(crate) runner: &'a dyn CommandRunner,
    pub(crate) catalog: DeviceCatalog<'a>,
    pub(crate) lvm: LvmTools<'a>,
    pub(crate) persist: &'a PersistentStore<'a>,
    pub(crate) paths: StoragePaths,
}

impl<'a> StorageProvisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, persist: &'a PersistentStore<'a>) -> Self {
        Self {
            runner,
            catalog: DeviceCatalog::new(runner),
            lvm: LvmTools::new(runner),
            persist,
            paths: StoragePaths::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: DeviceCatalog<'a>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_lvm(mut self, lvm: LvmTools<'a>) -> Self {
        self.lvm = lvm;
        self
    }

    pub fn with_paths(mut self, paths: StoragePaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn catalog(&self) -> &DeviceCatalog<'a> {
        &self.catalog
    }

    /// Provision storage for `plan`.
    ///
    /// Returns false on any failure. Failures found before the first
    /// destructive command leave the system untouched; later failures leave
    /// the partition tables as they are.
    pub fn perform_partitioning(&self, plan: &StoragePlan) -> bool {
        if let Err(e) = self.validate(plan) {
            error!("Skipping disk partitioning, nothing was changed: {}", e);
            return false;
        }
        match self.apply_layout(plan) {
            Ok(()) => {
                info!("Storage provisioning completed");
                true
            }
            Err(e) if e.is_validation() => {
                error!("Skipping disk partitioning: {}", e);
                false
            }
            Err(e) => {
                error!(
                    "Storage provisioning failed after partitioning started, partition tables are left as they are: {}",
                    e
                );
                false
            }
        }
    }

    /// [`perform_partitioning`](Self::perform_partitioning) with the error.
    pub fn provision(&self, plan: &StoragePlan) -> Result<()> {
        self.validate(plan)?;
        self.apply_layout(plan)
    }

    fn apply_layout(&self, plan: &StoragePlan) -> Result<()> {
        self.handle_fakeraid(plan)?;
        self.wipe_foreign_lvm(plan)?;

        let mut iscsi_drive = None;
        if let Some(target) = &plan.iscsi {
            let boot = plan
                .boot_drive
                .as_deref()
                .ok_or(StorageError::NoDeviceSelected)?;
            let drive = self.attach_iscsi(target)?;
            info!("iSCSI enabled, partitioning boot drive {}", boot);
            self.partition_boot_drive(plan, boot)?;
            self.create_iscsi_root(plan, &drive)?;
            iscsi_drive = Some(drive);
        } else if plan.root_install {
            let root = plan
                .root_drive
                .as_deref()
                .ok_or(StorageError::NoDeviceSelected)?;
            self.partition_root_drive(plan, root)?;
        }

        if iscsi_drive.is_none() {
            if let Some(root) = plan.root_drive.as_deref() {
                self.reread_partitions(root)?;
                if let Some(first) = plan.first_hostvg_drive().filter(|first| *first != root) {
                    self.parted(first, &["mklabel", plan.label.as_str()])?;
                }
            }
        }

        self.create_hostvg(plan, iscsi_drive.as_deref())?;
        if !plan.appvg_drives.is_empty() {
            self.create_appvg(plan)?;
        }

        if plan.crypt_swap.is_some() || plan.crypt_swap2.is_some() {
            self.persist_file("/etc/ovirt-crypttab");
        }
        Ok(())
    }

    /// Checks that run before anything on disk is touched.
    pub fn validate(&self, plan: &StoragePlan) -> Result<()> {
        if plan.is_iscsi_install() {
            if plan.boot_drive.is_none() {
                return Err(StorageError::NoDeviceSelected);
            }
        } else if plan.hostvg_drives.is_empty() {
            return Err(StorageError::NoDeviceSelected);
        }

        let overlap = plan.overlapping_devices();
        if !overlap.is_empty() {
            return Err(StorageError::VolumeGroupOverlap { devices: overlap });
        }

        self.check_partition_sizes(plan)?;

        let existing = self.volume_group_members(VolumeGroup::HostVg)?;
        if !existing.is_empty() || self.lvm.volume_group_exists(VolumeGroup::HostVg.name())? {
            return Err(StorageError::ExistingInstallation {
                vg: VolumeGroup::HostVg.name().to_string(),
                devices: existing,
            });
        }

        let mut planned = plan.target_drives();
        planned.extend(plan.appvg_drives.iter().cloned());
        let foreign_appvg: Vec<String> = self
            .volume_group_members(VolumeGroup::AppVg)?
            .into_iter()
            .filter(|pv| !planned.iter().any(|disk| node_sys::lvm::pv_belongs_to_disk(pv, disk)))
            .collect();
        if !foreign_appvg.is_empty() {
            return Err(StorageError::ExistingInstallation {
                vg: VolumeGroup::AppVg.name().to_string(),
                devices: foreign_appvg,
            });
        }
        Ok(())
    }

    /// Compare the selected drives' sizes with what the plan needs.
    pub fn check_partition_sizes(&self, plan: &StoragePlan) -> Result<()> {
        let sizes = &plan.sizes;

        if plan.is_iscsi_install() {
            let boot = plan
                .boot_drive
                .as_deref()
                .ok_or(StorageError::NoDeviceSelected)?;
            let space = self.catalog.size_mb(boot)?;
            if space > sizes.boot {
                return Ok(());
            }
            return Err(StorageError::insufficient("Boot", boot, space, sizes.boot));
        }

        let root = plan
            .root_drive
            .as_deref()
            .ok_or(StorageError::NoDeviceSelected)?;
        let root_space = self.catalog.size_mb(root)?;
        let mut hostvg_space = 0;
        for drive in &plan.hostvg_drives {
            hostvg_space += self.catalog.size_mb(drive)?;
        }

        let root_need = sizes.root_need();
        if root_need > root_space {
            return Err(StorageError::insufficient("Root", root, root_space, root_need));
        }

        let mut hostvg_need = sizes.hostvg_need();
        if plan.first_hostvg_drive() == Some(root) {
            hostvg_need += root_need;
        }
        if hostvg_need > hostvg_space {
            return Err(StorageError::insufficient(
                "HostVG",
                &plan.hostvg_drives.join(","),
                hostvg_space,
                hostvg_need,
            ));
        }
        info!("Required space: {}MB of {}MB", hostvg_need, hostvg_space);
        Ok(())
    }

    /// Physical volumes currently belonging to `vg`.
    pub fn volume_group_members(&self, vg: VolumeGroup) -> Result<Vec<String>> {
        Ok(self
            .lvm
            .physical_volumes()?
            .into_iter()
            .filter(|pv| pv.vg_name.as_deref() == Some(vg.name()))
            .map(|pv| pv.pv_name)
            .collect())
    }

    fn handle_fakeraid(&self, plan: &StoragePlan) -> Result<()> {
        let mut checked: Vec<&str> = Vec::new();
        for device in plan.hostvg_drives.iter().chain(plan.root_drive.iter()) {
            if checked.contains(&device.as_str()) {
                continue;
            }
            checked.push(device);
            if !self.has_fakeraid(device) {
                continue;
            }
            if !plan.wipe_fakeraid {
                return Err(StorageError::Fakeraid {
                    device: device.clone(),
                });
            }
            info!("Wiping fakeraid metadata on {}", device);
            self.runner.check(
                &CommandSpec::new("dmraid")
                    .args(["-rE", device.as_str()])
                    .stdin("y\n"),
            )?;
        }
        Ok(())
    }

    fn has_fakeraid(&self, device: &str) -> bool {
        match self.runner.run(&CommandSpec::new("dmraid").args(["-r", device])) {
            Ok(outcome) => outcome.success && outcome.stdout.lines().any(|l| !l.trim().is_empty()),
            Err(_) => false,
        }
    }

    fn wipe_foreign_lvm(&self, plan: &StoragePlan) -> Result<()> {
        let mut drives = plan.target_drives();
        for drive in &plan.appvg_drives {
            if !drives.contains(drive) {
                drives.push(drive.clone());
            }
        }
        drives.retain(|drive| {
            let present = self.runner.exists(Path::new(drive));
            if !present {
                info!("{} is no device, skipping LVM wipe", drive);
            }
            present
        });

        info!("Wiping foreign LVM on {:?}", drives);
        self.lvm.wipe_lvm_on_disks(&drives)?;
        debug!("Old LVM volume groups should be gone");
        Ok(())
    }

    fn attach_iscsi(&self, target: &IscsiTarget) -> Result<String> {
        if let Some(initiator) = &target.initiator {
            self.set_iscsi_initiator(initiator)?;
        }

        let portal = target.portal();
        self.run(
            "iscsiadm",
            &["-m", "discovery", "-p", &portal, "-t", "sendtargets"],
        )?;
        let before = match target.device {
            Some(_) => Vec::new(),
            None => self.catalog.candidate_paths(),
        };
        self.run("iscsiadm", &["-m", "node", "-T", &target.name, "-p", &portal, "-l"])?;
        self.try_run("multipath", &["-r"]);

        let device = match &target.device {
            Some(device) => device.clone(),
            None => {
                let after = self.catalog.candidate_paths();
                debug!("Devices before iSCSI login {:?}, after {:?}", before, after);
                after
                    .into_iter()
                    .find(|dev| !before.contains(dev))
                    .ok_or_else(|| StorageError::MissingSetting("OVIRT_ISCSI_INIT".into()))?
            }
        };
        Ok(self.catalog.canonicalize(&device))
    }

    /// Write and persist the iSCSI initiator name, then restart iscsid.
    pub fn set_iscsi_initiator(&self, name: &str) -> Result<()> {
        atomic_write(&self.paths.iscsi_initiator(), &format!("InitiatorName={name}\n"))?;
        self.persist_file(ISCSI_INITIATOR_FILE);
        info!("Initiator name set as {}", name);
        self.try_run("service", &["iscsid", "restart"]);
        Ok(())
    }

    fn partition_boot_drive(&self, plan: &StoragePlan, boot: &str) -> Result<()> {
        let sizes = &plan.sizes;
        self.wipe_partitions(boot);
        self.reread_partitions(boot)?;
        info!("Creating boot partitions on {}", boot);
        self.parted(boot, &["mklabel", plan.label.as_str()])?;
        self.create_efi_partition(boot, sizes.efi)?;
        self.parted(
            boot,
            &[
                "mkpart",
                "primary",
                "ext2",
                &mb(sizes.efi),
                &mb(sizes.boot_end()),
            ],
        )?;
        self.parted(
            boot,
            &[
                "mkpart",
                "primary",
                "ext2",
                &mb(sizes.boot_end()),
                &mb(sizes.boot_backup_end()),
            ],
        )?;
        self.parted(boot, &["set", "1", "boot", "on"])?;
        self.reread_partitions(boot)?;

        let part_boot = self.wait_for_partition(boot, 2)?;
        let part_backup = self.wait_for_partition(boot, 3)?;
        self.try_run("udevadm", &["settle"]);
        self.make_labeled_ext2(&part_boot, "Boot", true)?;
        self.make_labeled_ext2(&part_backup, "BootBackup", true)?;
        Ok(())
    }

    fn create_iscsi_root(&self, plan: &StoragePlan, drive: &str) -> Result<()> {
        let sizes = &plan.sizes;
        info!("Partitioning iSCSI root drive {}", drive);
        self.wipe_partitions(drive);
        self.reread_partitions(drive)?;
        self.parted(drive, &["mklabel", plan.label.as_str()])?;
        self.parted(drive, &["mkpart", "primary", "1M", &mb(sizes.root)])?;
        self.parted(
            drive,
            &["mkpart", "primary", "ext2", &mb(sizes.root), &mb(sizes.root * 2)],
        )?;
        self.runner.pause(Duration::from_secs(5));
        // some cciss devices fail mkfs without a reload
        self.try_run("multipath", &["-r"]);
        self.reread_partitions(drive)?;

        let part_root = self.wait_for_partition(drive, 1)?;
        let part_backup = self.wait_for_partition(drive, 2)?;
        self.make_labeled_ext2(&part_root, "Root", true)?;
        self.make_labeled_ext2(&part_backup, "RootBackup", true)?;
        info!("iSCSI root partitions created");
        Ok(())
    }

    fn partition_root_drive(&self, plan: &StoragePlan, root: &str) -> Result<()> {
        let sizes = &plan.sizes;
        info!("Partitioning root drive {}", root);
        self.wipe_partitions(root);
        self.reread_partitions(root)?;
        info!("Labeling drive {}", root);
        self.parted(root, &["mklabel", plan.label.as_str()])?;

        if self.is_efi_boot() {
            self.create_efi_partition(root, sizes.efi)?;
        } else {
            self.parted(root, &["mkpart", "primary", "1M", &mb(sizes.efi)])?;
            self.parted(root, &["set", "1", "bios_grub", "on"])?;
        }
        self.parted(
            root,
            &["mkpart", "primary", "ext2", &mb(sizes.efi), &mb(sizes.root_end())],
        )?;
        self.parted(
            root,
            &[
                "mkpart",
                "primary",
                "ext2",
                &mb(sizes.root_end()),
                &mb(sizes.root_backup_end()),
            ],
        )?;
        self.try_run("sync", &[]);
        self.try_run("udevadm", &["settle"]);
        self.try_run("partprobe", &[]);
        self.parted(root, &["set", "2", "boot", "on"])?;
        self.try_run("multipath", &["-r"]);
        self.reread_partitions(root)?;

        let part_root = self.wait_for_partition(root, 2)?;
        let part_backup = self.wait_for_partition(root, 3)?;
        self.make_labeled_ext2(&part_root, "Root", false)?;
        self.make_labeled_ext2(&part_backup, "RootBackup", true)?;
        Ok(())
    }

    fn create_efi_partition(&self, disk: &str, efi_size: u64) -> Result<()> {
        self.parted(disk, &["mkpart", "EFI", "1M", &mb(efi_size)])?;
        self.runner.pause(PARTITION_WAIT_INTERVAL);
        let part = self.wait_for_partition(disk, 1)?;
        self.run("ln", &["-snf", &part, &format!("{BY_LABEL}/EFI")])?;
        self.run("mkfs.vfat", &[&part])?;
        Ok(())
    }

    fn make_labeled_ext2(&self, part: &str, label: &str, link: bool) -> Result<()> {
        if link {
            self.run("ln", &["-snf", part, &format!("{BY_LABEL}/{label}")])?;
        }
        self.run("mke2fs", &[part, "-L", label])?;
        self.run("tune2fs", &["-c", "0", "-i", "0", part])?;
        Ok(())
    }

    pub fn is_efi_boot(&self) -> bool {
        self.paths.efi_firmware().exists()
    }

    /// Remove leftover HostVG mappings and clear the partition table.
    pub(crate) fn wipe_partitions(&self, drive: &str) {
        info!("Wiping partitions on {}", drive);
        if self.runner.exists(Path::new("/dev/mapper/HostVG-Swap")) {
            self.try_run("swapoff", &["-a"]);
        }
        if let Ok(out) = self
            .runner
            .output(&CommandSpec::new("dmsetup").args(["ls"]))
        {
            for name in devices::parse_dmsetup_names(&out)
                .into_iter()
                .filter(|name| name.contains(VolumeGroup::HostVg.name()))
            {
                self.try_run("dmsetup", &["remove", &name]);
            }
        }
        self.try_run("parted", &["-s", drive, "mklabel", "loop"]);
        self.try_run("wipefs", &["-a", drive]);
        self.try_run("sync", &[]);
    }

    /// Make the kernel re-read `drive`'s partition table.
    pub(crate) fn reread_partitions(&self, drive: &str) -> Result<()> {
        debug!("Rereading partition table of {}", drive);
        self.try_run("sync", &[]);
        if !drive.contains("/dev/mapper") {
            self.try_run("blockdev", &["--rereadpt", drive]);
            return Ok(());
        }

        self.try_run("kpartx", &["-a", drive]);
        self.try_run("partprobe", &[]);
        self.try_run("service", &["multipathd", "reload"]);
        self.try_run("multipath", &["-r"]);
        for attempt in 0..PARTITION_WAIT_ATTEMPTS {
            if self.runner.exists(Path::new(drive)) {
                return Ok(());
            }
            warn!(
                "{} is not available, waiting {} more seconds",
                drive,
                PARTITION_WAIT_ATTEMPTS - attempt
            );
            self.runner.pause(PARTITION_WAIT_INTERVAL);
        }
        Err(StorageError::DeviceNotReady {
            device: drive.to_string(),
        })
    }

    pub(crate) fn wait_for_partition(&self, disk: &str, number: u32) -> Result<String> {
        devices::wait_for_partition(
            self.runner,
            disk,
            number,
            PARTITION_WAIT_ATTEMPTS,
            PARTITION_WAIT_INTERVAL,
        )
        .ok_or_else(|| StorageError::PartitionNotFound {
            disk: disk.to_string(),
            number,
        })
    }

    /// First existing node of partition `number`, without waiting.
    pub(crate) fn partition_node(&self, disk: &str, number: u32) -> Option<String> {
        partition_candidates(disk, number)
            .into_iter()
            .find(|candidate| self.runner.exists(Path::new(candidate)))
    }

    pub(crate) fn parted(&self, disk: &str, script: &[&str]) -> Result<()> {
        let command = CommandSpec::new("parted")
            .args(["-s", disk, "--"])
            .args(script.iter().copied());
        debug!("{}", command.render());
        self.runner.check(&command)?;
        Ok(())
    }

    pub(crate) fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        self.runner
            .check(&CommandSpec::new(program).args(args.iter().copied()))?;
        Ok(())
    }

    /// Run a command whose failure is not fatal.
    pub(crate) fn try_run(&self, program: &str, args: &[&str]) -> bool {
        self.runner
            .succeeds(&CommandSpec::new(program).args(args.iter().copied()))
    }

    pub(crate) fn persist_file(&self, path: &str) {
        match self.persist.persist(path) {
            Ok(outcome) => debug!("Persisting {}: {:?}", path, outcome),
            Err(e) => warn!("Could not persist {}: {}", path, e),
        }
    }
}

pub(crate) fn mb(size: u64) -> String {
    format!("{size}M")
}

/// Unattended install from the settings store.
///
/// Forces a root install, refuses when HostVG or AppVG already exist on
/// some disk and requires `OVIRT_INIT`.
pub fn storage_auto(provisioner: &StorageProvisioner<'_>, store: &ConfigStore, mem_mb: u64) -> bool {
    let mut settings: BTreeMap<String, String> = match store.load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Cannot read {}: {}", store.path().display(), e);
            return false;
        }
    };

    if settings
        .get("OVIRT_INIT")
        .is_none_or(|init| init.trim_matches(',').trim().is_empty())
    {
        error!("Storage device is required for auto installation");
        return false;
    }
    settings.insert("OVIRT_ROOT_INSTALL".to_string(), "y".to_string());

    for vg in [VolumeGroup::HostVg, VolumeGroup::AppVg] {
        match provisioner.volume_group_members(vg) {
            Ok(members) if members.is_empty() => {}
            Ok(members) => {
                error!(
                    "{} exists on a separate disk ({}), manual intervention required",
                    vg,
                    members.join(", ")
                );
                return false;
            }
            Err(e) => {
                error!("Cannot inspect physical volumes: {}", e);
                return false;
            }
        }
    }

    let plan = match StoragePlan::from_settings(
        &settings,
        |dev| provisioner.catalog().canonicalize(dev),
        mem_mb,
    ) {
        Ok(plan) => plan,
        Err(e) => {
            error!("Invalid storage settings: {}", e);
            return false;
        }
    };
    provisioner.perform_partitioning(&plan)
}
