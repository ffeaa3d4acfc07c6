// SPDX-License-Identifier: GPL-3.0-only

//! Network settings enums

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// Where the primary interface's IP configuration lives
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkLayout {
    /// IP configuration on the NIC (or its VLAN) itself
    #[default]
    Direct,
    /// IP configuration on a synthetic `br<ifname>` bridge
    Bridged,
}

impl NetworkLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Bridged => "bridged",
        }
    }
}

impl FromStr for NetworkLayout {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "direct" => Ok(Self::Direct),
            "bridged" => Ok(Self::Bridged),
            _ => Err(UnknownVariant::new("network layout", value)),
        }
    }
}

impl fmt::Display for NetworkLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPv4 boot protocol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Bootproto {
    Dhcp,
    /// Static addressing
    None,
}

impl Bootproto {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dhcp => "dhcp",
            Self::None => "none",
        }
    }
}

impl FromStr for Bootproto {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dhcp" => Ok(Self::Dhcp),
            "none" | "static" => Ok(Self::None),
            _ => Err(UnknownVariant::new("boot protocol", value)),
        }
    }
}

/// IPv6 address configuration method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Ipv6Bootproto {
    Auto,
    Static,
    None,
    Dhcp,
}

impl Ipv6Bootproto {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Static => "static",
            Self::None => "none",
            Self::Dhcp => "dhcp",
        }
    }
}

impl FromStr for Ipv6Bootproto {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(Self::Auto),
            "static" => Ok(Self::Static),
            "none" => Ok(Self::None),
            "dhcp" => Ok(Self::Dhcp),
            _ => Err(UnknownVariant::new("IPv6 boot protocol", value)),
        }
    }
}

/// Contents of one `ifcfg-<device>` file
///
/// Keys are kept sorted so rendering is deterministic. `DEVICE` is always
/// present and always matches [`IfcfgRecord::device`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfcfgRecord {
    pub device: String,
    entries: BTreeMap<String, String>,
}

impl IfcfgRecord {
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        let mut entries = BTreeMap::new();
        entries.insert("DEVICE".to_string(), device.clone());
        Self { device, entries }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        if key != "DEVICE" {
            self.entries.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn unset(&mut self, key: &str) -> &mut Self {
        if key != "DEVICE" {
            self.entries.remove(key);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn file_name(&self) -> String {
        format!("ifcfg-{}", self.device)
    }

    /// Shell-compatible file content, one `KEY=VALUE` per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            if value.is_empty() || value.chars().any(|c| c.is_whitespace() || "\"'$`;&|".contains(c)) {
                out.push('"');
                for c in value.chars() {
                    if matches!(c, '"' | '\\' | '$' | '`') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            } else {
                out.push_str(value);
            }
            out.push('\n');
        }
        out
    }

    /// Read back a rendered file. Comments and malformed lines are ignored.
    pub fn parse(device: &str, content: &str) -> Self {
        let mut record = Self::new(device);
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            let value = if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                unescape(&value[1..value.len() - 1])
            } else {
                value.to_string()
            };
            record.set(key.trim(), value);
        }
        record
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
