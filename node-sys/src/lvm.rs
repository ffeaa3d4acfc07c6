// SPDX-License-Identifier: GPL-3.0-only

//! LVM inspection and volume group removal

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cmd::{CommandRunner, CommandSpec};
use crate::mounts::{self, MountEntry};
use crate::{Result, SysError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvRow {
    pub pv_name: String,
    pub vg_name: Option<String>,
}

fn parse_tabbed_line(line: &str) -> Vec<String> {
    line.split('\t')
        .map(|part| part.trim().to_string())
        .collect()
}

pub fn parse_pvs(output: &str) -> Vec<PvRow> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let cols = parse_tabbed_line(line);
            let vg_name = cols
                .get(1)
                .filter(|name| !name.is_empty())
                .cloned();

            Some(PvRow {
                pv_name: cols[0].clone(),
                vg_name,
            })
        })
        .collect()
}

fn parse_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `pv` is `disk` itself or one of its partitions
/// (`/dev/sda2`, `/dev/cciss/c0d0p2`, `/dev/mapper/mpathap3`).
pub fn pv_belongs_to_disk(pv: &str, disk: &str) -> bool {
    let Some(rest) = pv.strip_prefix(disk) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let digits = rest.strip_prefix('p').unwrap_or(rest);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Volume groups that must be removed before `disks` can be reused.
///
/// Fails when such a group also has a physical volume outside `disks`;
/// removing it would destroy data on a disk the caller did not select.
pub fn plan_vg_wipe(pvs: &[PvRow], disks: &[String]) -> Result<Vec<String>> {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for pv in pvs {
        if let Some(vg) = pv.vg_name.as_deref() {
            groups.entry(vg).or_default().push(pv.pv_name.as_str());
        }
    }

    let on_target = |pv: &str| disks.iter().any(|disk| pv_belongs_to_disk(pv, disk));

    let mut doomed = Vec::new();
    for (vg, members) in groups {
        if !members.iter().any(|pv| on_target(pv)) {
            continue;
        }
        let outside: Vec<&str> = members.into_iter().filter(|pv| !on_target(pv)).collect();
        if !outside.is_empty() {
            return Err(SysError::VolumeGroupSpansDisks {
                vg: vg.to_string(),
                outside: outside.join(", "),
            });
        }
        doomed.push(vg.to_string());
    }

    Ok(doomed)
}

/// Whether a mount is backed by a logical volume of `vg`.
fn mounted_from_vg(entry: &MountEntry, vg: &str) -> bool {
    entry.source.starts_with(&format!("/dev/mapper/{vg}-"))
        || entry.source.starts_with(&format!("/dev/{vg}/"))
}

pub struct LvmTools<'a> {
    runner: &'a dyn CommandRunner,
    mountinfo: PathBuf,
}

impl<'a> LvmTools<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self::with_mountinfo(runner, mounts::MOUNTINFO)
    }

    pub fn with_mountinfo(runner: &'a dyn CommandRunner, mountinfo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            mountinfo: mountinfo.into(),
        }
    }

    pub fn physical_volumes(&self) -> Result<Vec<PvRow>> {
        let out = self.runner.output(&CommandSpec::new("pvs").args([
            "--noheadings",
            "-o",
            "pv_name,vg_name",
            "--separator",
            "\t",
        ]))?;
        Ok(parse_pvs(&out))
    }

    pub fn volume_groups(&self) -> Result<Vec<String>> {
        let out = self
            .runner
            .output(&CommandSpec::new("vgs").args(["--noheadings", "-o", "vg_name"]))?;
        Ok(parse_names(&out))
    }

    pub fn volume_group_exists(&self, vg: &str) -> Result<bool> {
        Ok(self.volume_groups()?.iter().any(|name| name == vg))
    }

    pub fn logical_volume_paths(&self, vg: &str) -> Result<Vec<String>> {
        let out = self
            .runner
            .output(&CommandSpec::new("lvs").args(["--noheadings", "-o", "lv_path", vg]))?;
        Ok(parse_names(&out))
    }

    /// Unmount, deactivate and remove a volume group with all its volumes.
    pub fn wipe_volume_group(&self, vg: &str) -> Result<()> {
        info!("Wiping volume group {}", vg);

        let mut mount_points: Vec<String> = self
            .mount_table()?
            .into_iter()
            .filter(|entry| mounted_from_vg(entry, vg))
            .map(|entry| entry.mount_point)
            .collect();
        mount_points.sort();
        for mount_point in mount_points.iter().rev() {
            self.runner
                .check(&CommandSpec::new("umount").arg(mount_point))?;
        }

        for lv in self.logical_volume_paths(vg).unwrap_or_default() {
            // Not every volume is swap; failure here is expected.
            let _ = self.runner.succeeds(&CommandSpec::new("swapoff").arg(&lv));
        }

        self.runner
            .check(&CommandSpec::new("vgchange").args(["-a", "n", vg]))?;
        self.runner
            .check(&CommandSpec::new("vgremove").args(["-f", vg]))?;
        Ok(())
    }

    /// Remove every volume group living on `disks` and clear their PVs.
    pub fn wipe_lvm_on_disks(&self, disks: &[String]) -> Result<()> {
        let pvs = self.physical_volumes()?;
        let doomed = plan_vg_wipe(&pvs, disks)?;

        for vg in &doomed {
            self.wipe_volume_group(vg)?;
        }

        for pv in pvs
            .iter()
            .filter(|pv| disks.iter().any(|disk| pv_belongs_to_disk(&pv.pv_name, disk)))
        {
            if !self
                .runner
                .succeeds(&CommandSpec::new("pvremove").args(["-ff", "-y", &pv.pv_name]))
            {
                warn!("Could not remove physical volume {}", pv.pv_name);
            }
        }

        Ok(())
    }

    fn mount_table(&self) -> Result<Vec<MountEntry>> {
        if !Path::new(&self.mountinfo).exists() {
            return Ok(Vec::new());
        }
        let content =
            fs::read_to_string(&self.mountinfo).map_err(|e| SysError::path_io(&self.mountinfo, e))?;
        mounts::parse_mountinfo(&content)
    }
}
