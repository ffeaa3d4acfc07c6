// SPDX-License-Identifier: GPL-3.0-only

//! Interface records derived from the network settings
//!
//! The primary interface's IP configuration lands on exactly one device:
//! the bridge when bridged, else the VLAN device when tagged, else the NIC
//! (or bond) itself.

use node_config::sections::{Ipv6, Nameservers, Network, NetworkTopology, NicBonding};
use node_config::ConfigStore;
use node_types::{IfcfgRecord, Ipv6Bootproto, NetworkLayout};
use tracing::debug;

use crate::nics::NicInventory;
use crate::{NetworkError, Result};

/// Snapshot of every section that shapes the interface records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSettings {
    pub network: Network,
    pub bonding: NicBonding,
    pub topology: NetworkTopology,
    pub ipv6: Ipv6,
    pub nameservers: Nameservers,
}

impl NetworkSettings {
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        Ok(Self {
            network: store.retrieve_section()?,
            bonding: store.retrieve_section()?,
            topology: store.retrieve_section()?,
            ipv6: store.retrieve_section()?,
            nameservers: store.retrieve_section()?,
        })
    }

    /// Name of the bond, when one with slaves is configured.
    pub fn bond_name(&self) -> Option<&str> {
        if self.bonding.slaves.is_empty() {
            return None;
        }
        self.bonding.name.as_deref()
    }
}

/// Records to write and the resulting `NETWORKING` switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfacePlan {
    pub records: Vec<IfcfgRecord>,
    pub networking: bool,
}

impl InterfacePlan {
    pub fn record(&self, device: &str) -> Option<&IfcfgRecord> {
        self.records.iter().find(|record| record.device == device)
    }

    fn push(&mut self, record: IfcfgRecord) {
        self.records.retain(|existing| existing.device != record.device);
        self.records.push(record);
    }
}

/// `lo` is always rewritten.
pub fn loopback_record() -> IfcfgRecord {
    IfcfgRecord::new("lo")
        .with("IPADDR", "127.0.0.1")
        .with("NETMASK", "255.0.0.0")
        .with("ONBOOT", "yes")
}

/// Bond master carrying `BONDING_OPTS`.
pub fn bond_master_record(bonding: &NicBonding, name: &str) -> IfcfgRecord {
    let options = bonding
        .effective_options()
        .unwrap_or_else(|| NicBonding::DEFAULT_OPTIONS.to_string());
    IfcfgRecord::new(name)
        .with("ONBOOT", "yes")
        .with("TYPE", "Bond")
        .with("BONDING_OPTS", options)
}

pub fn bond_slave_record(slave: &str, master: &str, hwaddr: Option<String>) -> IfcfgRecord {
    let mut record = IfcfgRecord::new(slave)
        .with("SLAVE", "yes")
        .with("MASTER", master)
        .with("ONBOOT", "yes");
    if let Some(hwaddr) = hwaddr {
        record.set("HWADDR", hwaddr);
    }
    record
}

/// Fails when the primary device is one of the bond's slaves.
pub fn check_bond_slaves(settings: &NetworkSettings) -> Result<()> {
    if let Some(iface) = settings.network.iface.as_deref() {
        if settings.bonding.slaves.iter().any(|slave| slave == iface) {
            return Err(NetworkError::SlaveIsPrimary {
                device: iface.to_string(),
            });
        }
    }
    Ok(())
}

/// Build every record for `settings`.
///
/// Physical NICs that end up without a record get one with `ONBOOT=no` so
/// their MAC to name mapping survives a reboot.
pub fn plan_interfaces(settings: &NetworkSettings, nics: &NicInventory) -> Result<InterfacePlan> {
    check_bond_slaves(settings)?;

    let mut plan = InterfacePlan {
        records: Vec::new(),
        networking: false,
    };
    let iface = settings.network.iface.as_deref();

    if let Some(bond) = settings.bond_name() {
        if iface != Some(bond) {
            return Err(NetworkError::UnreferencedBond {
                bond: bond.to_string(),
            });
        }
        plan.push(bond_master_record(&settings.bonding, bond));
        for slave in &settings.bonding.slaves {
            plan.push(bond_slave_record(slave, bond, nics.hwaddr(slave)));
        }
        plan.networking = true;
    }

    if let Some(iface) = iface {
        write_primary(settings, nics, iface, &mut plan);
        plan.networking = true;
    }

    plan.push(loopback_record());

    for nic in nics.physical_nics() {
        if plan.record(&nic).is_some() {
            continue;
        }
        debug!("Keeping {} unconfigured", nic);
        let mut record = IfcfgRecord::new(&nic).with("ONBOOT", "no");
        if let Some(hwaddr) = nics.hwaddr(&nic) {
            record.set("HWADDR", hwaddr);
        }
        plan.push(record);
    }

    Ok(plan)
}

fn write_primary(settings: &NetworkSettings, nics: &NicInventory, iface: &str, plan: &mut InterfacePlan) {
    let bridged = settings.topology.effective() == NetworkLayout::Bridged;
    let bridge = format!("br{iface}");
    let mut nic = IfcfgRecord::new(iface).with("ONBOOT", "yes");

    if settings.bond_name() != Some(iface) {
        if let Some(hwaddr) = nics.hwaddr(iface) {
            nic.set("HWADDR", hwaddr);
        }
    } else {
        // the bond master record already carries its type and options
        if let Some(master) = plan.record(iface) {
            nic = master.clone();
        }
    }

    match settings.network.vlanid.as_deref() {
        Some(vlanid) => {
            let mut vlan = IfcfgRecord::new(format!("{iface}.{vlanid}"))
                .with("VLAN", "yes")
                .with("ONBOOT", "yes");
            if bridged {
                vlan.set("BRIDGE", &bridge);
            } else {
                assign_ip_config(settings, &mut vlan);
            }
            plan.push(vlan);
        }
        None if bridged => {
            nic.set("BRIDGE", &bridge);
        }
        None => assign_ip_config(settings, &mut nic),
    }

    if bridged {
        let mut record = IfcfgRecord::new(&bridge)
            .with("DELAY", "0")
            .with("TYPE", "Bridge");
        assign_ip_config(settings, &mut record);
        plan.push(record);
    }

    plan.push(nic);
}

/// Put the IPv4, IPv6 and peer settings on `record`.
pub fn assign_ip_config(settings: &NetworkSettings, record: &mut IfcfgRecord) {
    let network = &settings.network;
    if let Some(bootproto) = network.bootproto {
        record.set("BOOTPROTO", bootproto.as_str());
    }
    for (key, value) in [
        ("IPADDR", &network.ipaddr),
        ("NETMASK", &network.netmask),
        ("GATEWAY", &network.gateway),
    ] {
        match value {
            Some(value) => record.set(key, value.as_str()),
            None => record.unset(key),
        };
    }
    record.set("ONBOOT", "yes");
    record.set("PEERNTP", "yes");
    if !settings.nameservers.servers.is_empty() {
        record.set("PEERDNS", "no");
    }

    let ipv6 = &settings.ipv6;
    match ipv6.bootproto {
        None => {}
        Some(Ipv6Bootproto::None) => {
            record.set("IPV6INIT", "no");
        }
        Some(method) => {
            record
                .set("IPV6INIT", "yes")
                .set("IPV6FORWARDING", "no")
                .set("IPV6_AUTOCONF", "no");
            match method {
                Ipv6Bootproto::Auto => {
                    record.set("IPV6_AUTOCONF", "yes");
                }
                Ipv6Bootproto::Dhcp => {
                    record.set("DHCPV6C", "yes");
                }
                Ipv6Bootproto::Static => {
                    if let (Some(addr), Some(mask)) = (&ipv6.ipaddr, &ipv6.netmask) {
                        record.set("IPV6ADDR", format!("{addr}/{mask}"));
                    }
                    if let Some(gateway) = &ipv6.gateway {
                        record.set("IPV6_DEFAULTGW", gateway.as_str());
                    }
                }
                Ipv6Bootproto::None => {}
            }
        }
    }
}
