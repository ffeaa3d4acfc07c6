// SPDX-License-Identifier: GPL-3.0-only

use node_types::{Bootproto, Ipv6Bootproto, NetworkLayout};
use serde::Serialize;

use crate::section::{ConfigSection, Fields, list_value};
use crate::valid::Validator;
use crate::{ConfigError, Result};

/// Primary interface and its IPv4 configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Network {
    pub iface: Option<String>,
    pub bootproto: Option<Bootproto>,
    pub ipaddr: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
    pub vlanid: Option<String>,
}

impl Network {
    /// Disable all networking.
    pub fn no_networking() -> Self {
        Self::default()
    }

    pub fn dhcp(iface: impl Into<String>, vlanid: Option<String>) -> Self {
        Self {
            iface: Some(iface.into()),
            bootproto: Some(Bootproto::Dhcp),
            vlanid,
            ..Self::default()
        }
    }

    pub fn static_ip(
        iface: impl Into<String>,
        ipaddr: impl Into<String>,
        netmask: impl Into<String>,
        gateway: Option<String>,
        vlanid: Option<String>,
    ) -> Self {
        Self {
            iface: Some(iface.into()),
            bootproto: Some(Bootproto::None),
            ipaddr: Some(ipaddr.into()),
            netmask: Some(netmask.into()),
            gateway,
            vlanid,
        }
    }
}

impl ConfigSection for Network {
    const NAME: &'static str = "Network";
    const KEYS: &'static [&'static str] = &[
        "OVIRT_BOOTIF",
        "OVIRT_BOOTPROTO",
        "OVIRT_IP_ADDRESS",
        "OVIRT_IP_NETMASK",
        "OVIRT_IP_GATEWAY",
        "OVIRT_VLAN",
    ];

    fn validate(&self) -> Result<()> {
        let address = Validator::Ipv4.optional();
        address.check("ipaddr", self.ipaddr.as_deref())?;
        address.check("netmask", self.netmask.as_deref())?;
        address.check("gateway", self.gateway.as_deref())?;
        Validator::number(Some(1), Some(4094))
            .optional()
            .check("vlanid", self.vlanid.as_deref())?;
        if self.bootproto == Some(Bootproto::None) && self.ipaddr.is_none() {
            return Err(ConfigError::invalid(
                "ipaddr",
                "",
                "an address when static addressing is selected",
            ));
        }
        Ok(())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            self.iface.clone(),
            self.bootproto.map(|b| b.as_str().to_string()),
            self.ipaddr.clone(),
            self.netmask.clone(),
            self.gateway.clone(),
            self.vlanid.clone(),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            iface: fields.text(),
            bootproto: fields.parsed(),
            ipaddr: fields.text(),
            netmask: fields.text(),
            gateway: fields.text(),
            vlanid: fields.text(),
        }
    }
}

/// Bond device carrying the primary IP configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NicBonding {
    pub name: Option<String>,
    pub slaves: Vec<String>,
    pub options: Option<String>,
}

impl NicBonding {
    pub const DEFAULT_OPTIONS: &'static str = "mode=balance-rr miimon=100";

    pub fn new(name: impl Into<String>, slaves: Vec<String>, options: Option<String>) -> Self {
        Self {
            name: Some(name.into()),
            slaves,
            options,
        }
    }

    /// Remove all bonding.
    pub fn no_bond() -> Self {
        Self::default()
    }

    pub fn mode_8023ad(name: impl Into<String>, slaves: Vec<String>) -> Self {
        Self::new(name, slaves, Some("mode=4".to_string()))
    }

    /// Options in effect, falling back to the defaults for a named bond.
    pub fn effective_options(&self) -> Option<String> {
        self.name.as_ref()?;
        Some(
            self.options
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_OPTIONS.to_string()),
        )
    }
}

impl ConfigSection for NicBonding {
    const NAME: &'static str = "NicBonding";
    const KEYS: &'static [&'static str] =
        &["OVIRT_BOND_NAME", "OVIRT_BOND_SLAVES", "OVIRT_BOND_OPTIONS"];

    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if !name.starts_with("bond") {
                return Err(ConfigError::invalid(
                    "name",
                    name,
                    "an interface name starting with 'bond'",
                ));
            }
        }
        for slave in &self.slaves {
            Validator::NoSpaces.check("slaves", Some(slave))?;
        }
        Ok(())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            self.name.clone(),
            list_value(&self.slaves),
            self.effective_options(),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            name: fields.text(),
            slaves: fields.list(),
            options: fields.text(),
        }
    }
}

/// Direct or bridged topology for the primary interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkTopology {
    pub layout: Option<NetworkLayout>,
}

impl NetworkTopology {
    pub fn bridged() -> Self {
        Self {
            layout: Some(NetworkLayout::Bridged),
        }
    }

    pub fn direct() -> Self {
        Self {
            layout: Some(NetworkLayout::Direct),
        }
    }

    pub fn effective(&self) -> NetworkLayout {
        self.layout.unwrap_or_default()
    }
}

impl ConfigSection for NetworkTopology {
    const NAME: &'static str = "NetworkLayout";
    const KEYS: &'static [&'static str] = &["OVIRT_NETWORK_LAYOUT"];

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![self.layout.map(|l| l.as_str().to_string())]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            layout: fields.parsed(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ipv6 {
    pub bootproto: Option<Ipv6Bootproto>,
    pub ipaddr: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
}

impl Ipv6 {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn auto() -> Self {
        Self {
            bootproto: Some(Ipv6Bootproto::Auto),
            ..Self::default()
        }
    }

    pub fn dhcp() -> Self {
        Self {
            bootproto: Some(Ipv6Bootproto::Dhcp),
            ..Self::default()
        }
    }

    pub fn static_ip(
        address: impl Into<String>,
        netmask: impl Into<String>,
        gateway: Option<String>,
    ) -> Self {
        Self {
            bootproto: Some(Ipv6Bootproto::Static),
            ipaddr: Some(address.into()),
            netmask: Some(netmask.into()),
            gateway,
        }
    }
}

impl ConfigSection for Ipv6 {
    const NAME: &'static str = "IPv6";
    const KEYS: &'static [&'static str] = &[
        "OVIRT_IPV6",
        "OVIRT_IPV6_ADDRESS",
        "OVIRT_IPV6_NETMASK",
        "OVIRT_IPV6_GATEWAY",
    ];

    fn validate(&self) -> Result<()> {
        Validator::Ipv6
            .optional()
            .check("ipaddr", self.ipaddr.as_deref())?;
        Validator::number(Some(0), Some(128))
            .optional()
            .check("netmask", self.netmask.as_deref())?;
        Validator::Ipv6
            .optional()
            .check("gateway", self.gateway.as_deref())?;
        Ok(())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            self.bootproto.map(|b| b.as_str().to_string()),
            self.ipaddr.clone(),
            self.netmask.clone(),
            self.gateway.clone(),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            bootproto: fields.parsed(),
            ipaddr: fields.text(),
            netmask: fields.text(),
            gateway: fields.text(),
        }
    }
}
