// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use node_config::ConfigStore;
use node_config::sections::Network;
use node_sys::fs::{atomic_write, read_optional};
use node_sys::{CommandRunner, CommandSpec, PersistentStore, SysError};
use node_transaction::{Step, StepResult, Transaction};
use tracing::{debug, info, warn};

use crate::ifcfg::IfcfgStore;
use crate::layout::{
    InterfacePlan, NetworkSettings, bond_master_record, bond_slave_record, check_bond_slaves,
    plan_interfaces,
};
use crate::nics::NicInventory;
use crate::Result;

/// Stopped in this order and started in this order again
pub const NETWORK_SERVICES: [&str; 7] = [
    "network",
    "ntpd",
    "ntpdate",
    "rpcbind",
    "nfslock",
    "rpcidmapd",
    "rpcgssd",
];

const SYSCONFIG_NETWORK: &str = "/etc/sysconfig/network";
const HOSTS: &str = "/etc/hosts";
const UDEV_NET_RULES: &str = "/etc/udev/rules.d/70-persistent-net.rules";
const NODE_NET_RULES: &str = "/etc/udev/rules.d/71-persistent-node-net.rules";

pub struct NetworkProvisioner<'a> {
    runner: &'a dyn CommandRunner,
    persist: &'a PersistentStore<'a>,
    store: &'a ConfigStore,
    root: PathBuf,
    nics: NicInventory,
    ifcfg: IfcfgStore,
}

impl<'a> NetworkProvisioner<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        persist: &'a PersistentStore<'a>,
        store: &'a ConfigStore,
    ) -> Self {
        Self {
            runner,
            persist,
            store,
            root: PathBuf::from("/"),
            nics: NicInventory::new(),
            ifcfg: IfcfgStore::new(Path::new("/")),
        }
    }

    /// Operate on the filesystem mounted at `root`.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self.nics = NicInventory::with_root(root);
        self.ifcfg = IfcfgStore::new(root);
        self
    }

    pub fn ifcfg(&self) -> &IfcfgStore {
        &self.ifcfg
    }

    pub fn nics(&self) -> &NicInventory {
        &self.nics
    }

    /// Records the current settings would produce.
    pub fn plan(&self) -> Result<InterfacePlan> {
        let settings = NetworkSettings::from_store(self.store)?;
        plan_interfaces(&settings, &self.nics)
    }

    /// Tear down the current interfaces and write and start the configured
    /// ones.
    pub fn transaction(&self) -> Transaction<'_> {
        let mut tx = Transaction::new("Applying new network configuration");
        tx.push_fn("Stop network services", move || {
            self.services("stop");
            Ok(())
        });
        tx.push_fn("Remove existing configuration", move || {
            self.remove_configuration()?;
            Ok(())
        });
        tx.push(WriteConfiguration { net: self });
        tx.push_fn("Persist MAC-NIC mappings", move || {
            self.persist_mac_mapping()?;
            Ok(())
        });
        tx.push_fn("Start network services", move || {
            self.services("start");
            Ok(())
        });
        tx
    }

    /// Write (or, without slaves, remove) the bond configuration.
    pub fn bond_transaction(&self) -> Result<Transaction<'_>> {
        let settings = NetworkSettings::from_store(self.store)?;
        let mut tx = Transaction::new("Writing bond configuration");

        match settings.bond_name().map(str::to_string) {
            Some(bond) => {
                let bonding = settings.bonding.clone();
                let master = bond.clone();
                tx.push_fn("Writing bond master configuration", move || {
                    let record = bond_master_record(&bonding, &master);
                    self.write_record(&record)?;
                    Ok(())
                });
                tx.push(WriteSlaveConfigs {
                    net: self,
                    settings,
                    bond,
                });
            }
            None => {
                tx.push_fn("Clean potential bond configurations", move || {
                    self.remove_bond_configuration()?;
                    Ok(())
                });
            }
        }
        Ok(tx)
    }

    /// Set `PEERDNS=no` on every interface when DNS servers are configured
    /// manually, drop it otherwise.
    pub fn update_peerdns(&self, manual_dns: bool) -> Result<()> {
        for device in self.ifcfg.devices().into_iter().filter(|d| d != "lo") {
            let Some(mut record) = self.ifcfg.read(&device)? else {
                continue;
            };
            if manual_dns {
                record.set("PEERDNS", "no");
            } else {
                record.unset("PEERDNS");
            }
            self.ifcfg.write(&record)?;
        }
        Ok(())
    }

    fn services(&self, action: &str) {
        for service in NETWORK_SERVICES {
            let command = CommandSpec::new("service").args([service, action]);
            if !self.runner.succeeds(&command) {
                debug!("service {} {} failed", service, action);
            }
        }
    }

    fn remove_configuration(&self) -> Result<()> {
        self.try_run("killall", &["dhclient"]);

        let vlans = self.nics.vlans();
        debug!("Deleting VLAN devices {:?}", vlans);
        for vlan in vlans {
            self.try_run("ip", &["link", "delete", &vlan]);
            self.delete_ifcfg(&vlan)?;
        }

        for bridge in self.nics.bridges() {
            self.try_run("ip", &["link", "set", &bridge, "down"]);
            self.try_run("ip", &["link", "delete", &bridge, "type", "bridge"]);
            self.delete_ifcfg(&bridge)?;
        }

        for bond in self.nics.bonds() {
            self.try_run("ip", &["link", "delete", &bond]);
        }

        let remaining = self.ifcfg.devices();
        debug!("Removing remaining ifcfg files for {:?}", remaining);
        for device in remaining {
            self.delete_ifcfg(&device)?;
        }
        Ok(())
    }

    fn write_configuration(&self, plan: &InterfacePlan) -> Result<()> {
        for record in &plan.records {
            self.write_record(record)?;
        }

        let path = self.live(SYSCONFIG_NETWORK);
        let mut lines: Vec<String> = read_optional(&path)?
            .unwrap_or_default()
            .lines()
            .filter(|line| !line.trim_start().starts_with("NETWORKING="))
            .map(str::to_string)
            .collect();
        lines.push(format!(
            "NETWORKING={}",
            if plan.networking { "yes" } else { "no" }
        ));
        atomic_write(&path, &(lines.join("\n") + "\n"))?;

        self.persist_file(SYSCONFIG_NETWORK);
        if self.live(HOSTS).exists() {
            self.persist_file(HOSTS);
        }
        Ok(())
    }

    fn persist_mac_mapping(&self) -> Result<()> {
        let rules = self.live(UDEV_NET_RULES);
        if !rules.exists() {
            debug!("No udev net rules to keep");
            return Ok(());
        }
        let target = self.live(NODE_NET_RULES);
        fs::copy(&rules, &target).map_err(SysError::from)?;
        self.persist_file(NODE_NET_RULES);
        Ok(())
    }

    fn remove_bond_configuration(&self) -> Result<()> {
        let network: Network = self.store.retrieve_section()?;
        if network.iface.as_deref().is_some_and(|iface| iface.starts_with("bond")) {
            info!("Primary device was a bond, disabling networking");
            self.store.update_section(&Network::no_networking())?;
        }

        for device in self.ifcfg.devices() {
            let Some(mut record) = self.ifcfg.read(&device)? else {
                continue;
            };
            if record.contains("MASTER") {
                debug!("Removing master from {}", device);
                record.unset("MASTER").unset("SLAVE");
                self.write_record(&record)?;
            } else if device.starts_with("bond") {
                debug!("Removing master {}", device);
                self.delete_ifcfg(&device)?;
            }
        }

        for bond in self.nics.bonds() {
            self.try_run("ip", &["link", "delete", &bond]);
        }
        Ok(())
    }

    fn write_record(&self, record: &node_types::IfcfgRecord) -> Result<()> {
        self.ifcfg.write(record)?;
        self.persist_file(&IfcfgStore::logical_path(&record.device));
        Ok(())
    }

    fn delete_ifcfg(&self, device: &str) -> Result<()> {
        self.persist.delete(&IfcfgStore::logical_path(device))?;
        Ok(())
    }

    fn persist_file(&self, path: &str) {
        if let Err(e) = self.persist.persist(path) {
            warn!("Could not persist {}: {}", path, e);
        }
    }

    fn try_run(&self, program: &str, args: &[&str]) -> bool {
        self.runner
            .succeeds(&CommandSpec::new(program).args(args.iter().copied()))
    }

    fn live(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }
}

/// Plans in `prepare` so invalid settings stop the transaction before
/// anything is removed, and again in `commit` to pick up settings changed
/// by earlier steps.
struct WriteConfiguration<'p> {
    net: &'p NetworkProvisioner<'p>,
}

impl Step for WriteConfiguration<'_> {
    fn title(&self) -> &str {
        "Write new configuration"
    }

    fn prepare(&mut self) -> StepResult {
        self.net.plan()?;
        Ok(())
    }

    fn commit(&mut self) -> StepResult {
        let plan = self.net.plan()?;
        self.net.write_configuration(&plan)?;
        Ok(())
    }
}

struct WriteSlaveConfigs<'p> {
    net: &'p NetworkProvisioner<'p>,
    settings: NetworkSettings,
    bond: String,
}

impl Step for WriteSlaveConfigs<'_> {
    fn title(&self) -> &str {
        "Writing bond slaves configuration"
    }

    fn prepare(&mut self) -> StepResult {
        check_bond_slaves(&self.settings)?;
        Ok(())
    }

    fn commit(&mut self) -> StepResult {
        for slave in &self.settings.bonding.slaves {
            let record = bond_slave_record(slave, &self.bond, self.net.nics.hwaddr(slave));
            self.net.write_record(&record)?;
        }
        Ok(())
    }
}
