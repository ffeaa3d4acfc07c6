// SPDX-License-Identifier: GPL-3.0-only

//! `ifcfg-*` files in the network-scripts directory

use std::fs;
use std::path::{Path, PathBuf};

use node_sys::fs::{atomic_write, read_optional};
use node_types::IfcfgRecord;
use tracing::debug;

use crate::Result;

pub const NETWORK_SCRIPTS_DIR: &str = "/etc/sysconfig/network-scripts";

#[derive(Debug, Clone)]
pub struct IfcfgStore {
    dir: PathBuf,
}

impl IfcfgStore {
    /// Store below the filesystem mounted at `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(NETWORK_SCRIPTS_DIR.trim_start_matches('/')),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, device: &str) -> PathBuf {
        self.dir.join(format!("ifcfg-{device}"))
    }

    /// Host path of a device's file, as used by the persistence manifest.
    pub fn logical_path(device: &str) -> String {
        format!("{NETWORK_SCRIPTS_DIR}/ifcfg-{device}")
    }

    /// Devices that currently have a file, sorted.
    pub fn devices(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut devices: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("ifcfg-"))
                    .filter(|device| !device.is_empty() && !device.ends_with(".tmp"))
                    .map(str::to_string)
            })
            .collect();
        devices.sort();
        devices
    }

    pub fn read(&self, device: &str) -> Result<Option<IfcfgRecord>> {
        Ok(read_optional(&self.path(device))?
            .map(|content| IfcfgRecord::parse(device, &content)))
    }

    pub fn write(&self, record: &IfcfgRecord) -> Result<PathBuf> {
        let path = self.path(&record.device);
        debug!("Writing {:?}", path);
        atomic_write(&path, &record.render())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_testing::NodeRoot;

    #[test]
    fn written_records_are_listed_and_read_back() {
        let root = NodeRoot::new().unwrap();
        let store = IfcfgStore::new(root.root());
        assert!(store.devices().is_empty());

        let record = IfcfgRecord::new("eth0")
            .with("BOOTPROTO", "dhcp")
            .with("ONBOOT", "yes");
        store.write(&record).unwrap();
        store.write(&IfcfgRecord::new("lo")).unwrap();

        assert_eq!(store.devices(), vec!["eth0", "lo"]);
        assert_eq!(store.read("eth0").unwrap(), Some(record));
        assert_eq!(store.read("eth1").unwrap(), None);
        assert_eq!(
            IfcfgStore::logical_path("eth0"),
            "/etc/sysconfig/network-scripts/ifcfg-eth0"
        );
    }
}
