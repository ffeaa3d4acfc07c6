// SPDX-License-Identifier: GPL-3.0-only

//! Block device discovery and canonicalization
//!
//! Devices are collected from sysfs, `/dev/disk/by-id`, `/dev/cciss` and the
//! active multipath maps. Raw members of a multipath map are dropped so the
//! final list carries exactly one entry per disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use node_types::{BusType, Device};
use tracing::{debug, info, warn};

use crate::cmd::{CommandRunner, CommandSpec};
use crate::{Result, SysError};

/// Filesystem roots consulted during discovery
#[derive(Debug, Clone)]
pub struct CatalogPaths {
    pub sys_block: PathBuf,
    pub dev_by_id: PathBuf,
    pub dev_cciss: PathBuf,
}

impl Default for CatalogPaths {
    fn default() -> Self {
        Self {
            sys_block: PathBuf::from("/sys/block"),
            dev_by_id: PathBuf::from("/dev/disk/by-id"),
            dev_cciss: PathBuf::from("/dev/cciss"),
        }
    }
}

pub struct DeviceCatalog<'a> {
    runner: &'a dyn CommandRunner,
    paths: CatalogPaths,
}

impl<'a> DeviceCatalog<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self::with_paths(runner, CatalogPaths::default())
    }

    pub fn with_paths(runner: &'a dyn CommandRunner, paths: CatalogPaths) -> Self {
        Self { runner, paths }
    }

    /// List every usable disk, one entry per physical or logical disk.
    ///
    /// CD-ROMs, loop devices and devices whose size cannot be read are
    /// skipped and logged rather than reported as errors.
    pub fn list_devices(&self) -> Vec<Device> {
        let mut seen = BTreeSet::new();
        let mut devices = Vec::new();

        for path in self.candidate_paths() {
            if path.starts_with("/dev/loop") || path.starts_with("/dev/dm-") {
                continue;
            }

            let props = self.udev_properties(&path);
            if props.contains_key("ID_CDROM") {
                debug!("Skipping CD-ROM device {}", path);
                continue;
            }

            let size_mb = match self.size_mb(&path) {
                Ok(size) => size,
                Err(e) => {
                    debug!("Skipping {}: size query failed: {}", path, e);
                    continue;
                }
            };

            let canonical = self.canonicalize(&path);
            if !seen.insert(canonical.clone()) {
                continue;
            }

            devices.push(device_from_properties(canonical, size_mb, &props));
        }

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        info!("Found {} usable devices", devices.len());
        devices
    }

    /// Raw discovery without size or udev filtering.
    pub fn candidate_paths(&self) -> Vec<String> {
        let mut devices = Vec::new();

        for name in dir_names(&self.paths.sys_block) {
            if is_disk_name(&name) {
                devices.push(format!("/dev/{name}"));
            }
        }

        for entry in dir_entries(&self.paths.dev_by_id) {
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.contains("-part") {
                continue;
            }
            let Ok(target) = fs::read_link(&entry) else {
                continue;
            };
            let Some(base) = target.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let dev = format!("/dev/{base}");
            if self.udev_properties(&dev).contains_key("ID_BUS") {
                devices.push(dev);
            }
        }

        for name in dir_names(&self.paths.dev_cciss) {
            if !is_partition_suffix(&name) {
                devices.push(format!("/dev/cciss/{name}"));
            }
        }

        let mut excluded = BTreeSet::new();
        for map in self.multipath_maps() {
            devices.push(format!("/dev/mapper/{map}"));
            excluded.extend(self.multipath_members(&map));
            if let Some((_, dm)) = self.multipath_map_for(&map) {
                excluded.insert(dm);
            }
        }

        let mut unique = Vec::new();
        for dev in devices {
            let base = dev.rsplit('/').next().unwrap_or(dev.as_str());
            if excluded.contains(base) || dev.contains("/dev/dm-") {
                continue;
            }
            if !unique.contains(&dev) {
                unique.push(dev);
            }
        }
        unique
    }

    /// Translate a device path to its device-mapper spelling when multipath
    /// owns it. Already-mapped paths are returned unchanged.
    pub fn canonicalize(&self, path: &str) -> String {
        if path.starts_with("/dev/mapper/") {
            return path.to_string();
        }

        let mut dev = path.to_string();
        if path.starts_with("/dev/cciss/") {
            match self.runner.output(&CommandSpec::new("cciss_id").arg(path)) {
                Ok(out) if !out.trim().is_empty() => {
                    dev = format!("/dev/mapper/{}", out.trim());
                }
                _ => debug!("cciss_id gave no mapping for {}", path),
            }
        }

        match self.multipath_map_for(&dev) {
            Some((map, _)) => {
                debug!("Translated {} to /dev/mapper/{}", path, map);
                format!("/dev/mapper/{map}")
            }
            None => dev,
        }
    }

    /// Whole-disk size in MB from `sfdisk -s` (KB blocks).
    pub fn size_mb(&self, device: &str) -> Result<u64> {
        let command = CommandSpec::new("sfdisk").args(["-s", device]);
        let out = self.runner.output(&command)?;
        let kb: u64 = out
            .trim()
            .parse()
            .map_err(|_| SysError::UnexpectedOutput {
                command: command.render(),
                output: out.trim().to_string(),
            })?;
        Ok(kb / 1024)
    }

    pub fn udev_properties(&self, device: &str) -> BTreeMap<String, String> {
        let command = CommandSpec::new("udevadm").args([
            "info",
            "--query=property",
            &format!("--name={device}"),
        ]);
        match self.runner.output(&command) {
            Ok(out) => parse_udev_properties(&out),
            Err(_) => BTreeMap::new(),
        }
    }

    fn multipath_maps(&self) -> Vec<String> {
        let command = CommandSpec::new("dmsetup").args(["ls", "--target=multipath"]);
        match self.runner.output(&command) {
            Ok(out) => parse_dmsetup_names(&out),
            Err(_) => Vec::new(),
        }
    }

    /// Kernel names (`sda`, `sdb`) of the paths under a multipath map.
    fn multipath_members(&self, map: &str) -> Vec<String> {
        let command = CommandSpec::new("dmsetup").args(["deps", map]);
        let Ok(out) = self.runner.output(&command) else {
            return Vec::new();
        };
        parse_dmsetup_deps(&out)
            .into_iter()
            .filter_map(|(major, minor)| self.block_name_for(major, minor))
            .collect()
    }

    fn block_name_for(&self, major: u32, minor: u32) -> Option<String> {
        let wanted = format!("{major}:{minor}");
        dir_names(&self.paths.sys_block).into_iter().find(|name| {
            fs::read_to_string(self.paths.sys_block.join(name).join("dev"))
                .map(|content| content.trim() == wanted)
                .unwrap_or(false)
        })
    }

    fn multipath_map_for(&self, dev: &str) -> Option<(String, String)> {
        let out = self
            .runner
            .output(&CommandSpec::new("multipath").args(["-ll", dev]))
            .ok()?;
        parse_multipath_map(&out)
    }
}

/// Candidate device nodes for partition `number` of `disk`.
///
/// `/dev/sda` style disks use `<disk>N`, cciss and mapper devices `<disk>pN`.
pub fn partition_candidates(disk: &str, number: u32) -> [String; 2] {
    [format!("{disk}{number}"), format!("{disk}p{number}")]
}

/// Poll until a node for partition `number` appears.
///
/// Node creation is asynchronous to the partitioning command's exit, so
/// this checks up to `attempts` times with `interval` in between.
pub fn wait_for_partition(
    runner: &dyn CommandRunner,
    disk: &str,
    number: u32,
    attempts: u32,
    interval: Duration,
) -> Option<String> {
    for attempt in 0..attempts {
        for candidate in partition_candidates(disk, number) {
            if runner.exists(Path::new(&candidate)) {
                return Some(candidate);
            }
        }
        debug!(
            "Partition {} of {} not available yet (attempt {}/{})",
            number,
            disk,
            attempt + 1,
            attempts
        );
        runner.pause(interval);
    }
    warn!("Timed out waiting for partition {} on {}", number, disk);
    None
}

fn device_from_properties(path: String, size_mb: u64, props: &BTreeMap<String, String>) -> Device {
    let serial = props.get("ID_SERIAL").cloned();
    let description = props
        .get("ID_SCSI_COMPAT")
        .cloned()
        .or_else(|| path.starts_with("/dev/vd").then(|| "virtio disk".to_string()))
        .or_else(|| serial.clone())
        .unwrap_or_else(|| "unknown".to_string());

    Device {
        bus: BusType::classify(props.get("ID_BUS").map(String::as_str), &path),
        path,
        size_mb,
        model: props.get("ID_MODEL").cloned(),
        serial,
        description,
    }
}

/// `sda`, `vdb`, `hda` style whole-disk names.
pub fn is_disk_name(name: &str) -> bool {
    let prefix_len = name
        .chars()
        .take_while(|c| matches!(c, 'h' | 's' | 'v'))
        .count();
    prefix_len > 0 && name[prefix_len..].starts_with('d')
}

fn is_partition_suffix(name: &str) -> bool {
    match name.rfind('p') {
        Some(idx) => {
            let digits = &name[idx + 1..];
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

pub fn parse_udev_properties(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Map names from `dmsetup ls --target=multipath`.
pub fn parse_dmsetup_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| *name != "No")
        .map(str::to_string)
        .collect()
}

/// `(major, minor)` pairs from `dmsetup deps` output such as
/// `2 dependencies  : (8, 16) (8, 0)`.
pub fn parse_dmsetup_deps(output: &str) -> Vec<(u32, u32)> {
    let deps = output.rsplit(':').next().unwrap_or(output);
    deps.split(')')
        .filter_map(|chunk| {
            let inner = chunk.trim().strip_prefix('(')?;
            let (major, minor) = inner.split_once(',')?;
            Some((major.trim().parse().ok()?, minor.trim().parse().ok()?))
        })
        .collect()
}

/// Map name and `dm-N` node from `multipath -ll` output.
pub fn parse_multipath_map(output: &str) -> Option<(String, String)> {
    output.lines().find_map(|line| {
        let dm = line.split_whitespace().find(|token| is_dm_name(token))?;
        let name = line.split_whitespace().next()?;
        Some((name.to_string(), dm.to_string()))
    })
}

fn is_dm_name(token: &str) -> bool {
    token
        .strip_prefix("dm-")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|entry| entry.path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = dir_entries(dir)
        .into_iter()
        .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_disk_names() {
        assert!(is_disk_name("sda"));
        assert!(is_disk_name("vdb"));
        assert!(is_disk_name("hda"));
        assert!(!is_disk_name("loop0"));
        assert!(!is_disk_name("dm-0"));
        assert!(!is_disk_name("sr0"));
        assert!(!is_disk_name("nvme0n1"));
    }

    #[test]
    fn recognizes_cciss_partitions() {
        assert!(is_partition_suffix("c0d0p1"));
        assert!(!is_partition_suffix("c0d0"));
    }

    #[test]
    fn parses_dmsetup_output() {
        assert_eq!(
            parse_dmsetup_names("mpatha\t(253:0)\nmpathb\t(253:1)\n"),
            vec!["mpatha".to_string(), "mpathb".to_string()]
        );
        assert!(parse_dmsetup_names("No devices found\n").is_empty());
        assert_eq!(
            parse_dmsetup_deps("2 dependencies  : (8, 16) (8, 0)\n"),
            vec![(8, 16), (8, 0)]
        );
    }

    #[test]
    fn parses_multipath_topology() {
        let out = "mpatha (360014051f3a9d3e2c2b4cfa2dbd2a1f7) dm-0 LIO-ORG,disk0\n\
                   size=10G features='0' hwhandler='1 alua' wp=rw\n\
                   `-+- policy='service-time 0' prio=50 status=active\n  \
                   `- 2:0:0:0 sda 8:0 active ready running\n";
        assert_eq!(
            parse_multipath_map(out),
            Some(("mpatha".to_string(), "dm-0".to_string()))
        );
        assert_eq!(parse_multipath_map(""), None);
    }

    #[test]
    fn parses_udev_properties() {
        let props = parse_udev_properties("DEVNAME=/dev/sda\nID_BUS=ata\nID_MODEL=QEMU_HARDDISK\n");
        assert_eq!(props.get("ID_BUS").map(String::as_str), Some("ata"));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn partition_naming_conventions() {
        assert_eq!(
            partition_candidates("/dev/cciss/c0d0", 2),
            ["/dev/cciss/c0d02".to_string(), "/dev/cciss/c0d0p2".to_string()]
        );
    }

    #[test]
    fn describes_virtio_devices() {
        let device = device_from_properties("/dev/vda".to_string(), 10240, &BTreeMap::new());
        assert_eq!(device.description, "virtio disk");
        assert_eq!(device.bus, BusType::Virtio);
    }
}
