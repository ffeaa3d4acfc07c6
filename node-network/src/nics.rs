// SPDX-License-Identifier: GPL-3.0-only

//! Network interfaces as seen by the kernel

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Reads interface state from sysfs and procfs.
#[derive(Debug, Clone)]
pub struct NicInventory {
    sys_class_net: PathBuf,
    proc_vlan_config: PathBuf,
}

impl Default for NicInventory {
    fn default() -> Self {
        Self::with_root(Path::new("/"))
    }
}

impl NicInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inventory of a filesystem mounted at `root`.
    pub fn with_root(root: &Path) -> Self {
        Self {
            sys_class_net: root.join("sys/class/net"),
            proc_vlan_config: root.join("proc/net/vlan/config"),
        }
    }

    /// All interface names, sorted.
    pub fn interfaces(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.sys_class_net) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Interfaces backed by a device, excluding bridges, bonds and VLANs.
    pub fn physical_nics(&self) -> Vec<String> {
        self.interfaces()
            .into_iter()
            .filter(|name| self.sys_class_net.join(name).join("device").exists())
            .collect()
    }

    pub fn bridges(&self) -> Vec<String> {
        self.interfaces()
            .into_iter()
            .filter(|name| self.sys_class_net.join(name).join("bridge").is_dir())
            .collect()
    }

    pub fn bonds(&self) -> Vec<String> {
        fs::read_to_string(self.sys_class_net.join("bonding_masters"))
            .map(|content| content.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn vlans(&self) -> Vec<String> {
        match fs::read_to_string(&self.proc_vlan_config) {
            Ok(content) => parse_vlan_config(&content),
            Err(_) => {
                debug!("No VLAN support loaded");
                Vec::new()
            }
        }
    }

    /// MAC address of `nic`, if the kernel exposes one.
    pub fn hwaddr(&self, nic: &str) -> Option<String> {
        fs::read_to_string(self.sys_class_net.join(nic).join("address"))
            .ok()
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
    }
}

/// VLAN device names from `/proc/net/vlan/config`.
pub fn parse_vlan_config(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| line.contains('|') && !line.starts_with("VLAN Dev name"))
        .filter_map(|line| line.split('|').next())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
