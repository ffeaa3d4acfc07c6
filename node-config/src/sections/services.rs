// SPDX-License-Identifier: GPL-3.0-only

use serde::Serialize;

use crate::section::{ConfigSection, Fields, flag_value, list_value};
use crate::valid::Validator;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hostname {
    pub hostname: Option<String>,
}

impl ConfigSection for Hostname {
    const NAME: &'static str = "Hostname";
    const KEYS: &'static [&'static str] = &["OVIRT_HOSTNAME"];

    fn validate(&self) -> Result<()> {
        Validator::FqdnOrIp
            .optional()
            .check("hostname", self.hostname.as_deref())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![self.hostname.clone()]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            hostname: fields.text(),
        }
    }
}

macro_rules! server_list_section {
    ($(#[$meta:meta])* $name:ident, $label:literal, $key:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
        pub struct $name {
            pub servers: Vec<String>,
        }

        impl ConfigSection for $name {
            const NAME: &'static str = $label;
            const KEYS: &'static [&'static str] = &[$key];

            fn validate(&self) -> Result<()> {
                for server in self.servers.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
                    Validator::FqdnOrIp.check("servers", Some(server))?;
                }
                Ok(())
            }

            fn encode(&self) -> Vec<Option<String>> {
                vec![list_value(&self.servers)]
            }

            fn decode(fields: &mut Fields) -> Self {
                Self {
                    servers: fields.list(),
                }
            }
        }
    };
}

server_list_section!(
    /// DNS servers, written to resolv.conf in order
    Nameservers,
    "Nameservers",
    "OVIRT_DNS"
);
server_list_section!(
    /// NTP servers
    Timeservers,
    "Timeservers",
    "OVIRT_NTP"
);

macro_rules! server_port_section {
    ($(#[$meta:meta])* $name:ident, $label:literal, $server_key:literal, $port_key:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
        pub struct $name {
            pub server: Option<String>,
            pub port: Option<String>,
        }

        impl $name {
            pub fn new(server: impl Into<String>, port: impl Into<String>) -> Self {
                Self {
                    server: Some(server.into()),
                    port: Some(port.into()),
                }
            }
        }

        impl ConfigSection for $name {
            const NAME: &'static str = $label;
            const KEYS: &'static [&'static str] = &[$server_key, $port_key];

            fn validate(&self) -> Result<()> {
                Validator::FqdnOrIp
                    .optional()
                    .check("server", self.server.as_deref())?;
                Validator::Port.optional().check("port", self.port.as_deref())
            }

            fn encode(&self) -> Vec<Option<String>> {
                vec![self.server.clone(), self.port.clone()]
            }

            fn decode(fields: &mut Fields) -> Self {
                Self {
                    server: fields.text(),
                    port: fields.text(),
                }
            }
        }
    };
}

server_port_section!(
    /// Remote rsyslog target
    Syslog,
    "Syslog",
    "OVIRT_SYSLOG_SERVER",
    "OVIRT_SYSLOG_PORT"
);
server_port_section!(
    /// collectd network plugin target
    Collectd,
    "Collectd",
    "OVIRT_COLLECTD_SERVER",
    "OVIRT_COLLECTD_PORT"
);
server_port_section!(
    Netconsole,
    "Netconsole",
    "OVIRT_NETCONSOLE_SERVER",
    "OVIRT_NETCONSOLE_PORT"
);

/// Crash dump destination. At most one of the three is used, NFS first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KDump {
    pub nfs: Option<String>,
    pub ssh: Option<String>,
    pub local: bool,
}

impl KDump {
    pub fn nfs(location: impl Into<String>) -> Self {
        Self {
            nfs: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn ssh(location: impl Into<String>) -> Self {
        Self {
            ssh: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn local() -> Self {
        Self {
            local: true,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

impl ConfigSection for KDump {
    const NAME: &'static str = "KDump";
    const KEYS: &'static [&'static str] =
        &["OVIRT_KDUMP_NFS", "OVIRT_KDUMP_SSH", "OVIRT_KDUMP_LOCAL"];

    fn validate(&self) -> Result<()> {
        Validator::NfsAddress
            .optional()
            .check("nfs", self.nfs.as_deref())?;
        Validator::SshAddress
            .optional()
            .check("ssh", self.ssh.as_deref())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            self.nfs.clone(),
            self.ssh.clone(),
            flag_value(self.local, "true"),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            nfs: fields.text(),
            ssh: fields.text(),
            local: fields.flag(),
        }
    }
}

/// iSCSI initiator and optional target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Iscsi {
    pub name: Option<String>,
    pub target_name: Option<String>,
    pub target_host: Option<String>,
    pub target_port: Option<String>,
}

impl ConfigSection for Iscsi {
    const NAME: &'static str = "iSCSI";
    const KEYS: &'static [&'static str] = &[
        "OVIRT_ISCSI_NODE_NAME",
        "OVIRT_ISCSI_TARGET_NAME",
        "OVIRT_ISCSI_TARGET_IP",
        "OVIRT_ISCSI_TARGET_PORT",
    ];

    fn validate(&self) -> Result<()> {
        Validator::Iqn.check("name", self.name.as_deref())?;
        Validator::Iqn
            .optional()
            .check("target_name", self.target_name.as_deref())?;
        Validator::FqdnOrIp
            .optional()
            .check("target_host", self.target_host.as_deref())?;
        Validator::Port
            .optional()
            .check("target_port", self.target_port.as_deref())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            self.name.clone(),
            self.target_name.clone(),
            self.target_host.clone(),
            self.target_port.clone(),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            name: fields.text(),
            target_name: fields.text(),
            target_host: fields.text(),
            target_port: fields.text(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Logrotate {
    /// Maximum log file size in KB
    pub max_size: Option<String>,
}

impl ConfigSection for Logrotate {
    const NAME: &'static str = "Logrotate";
    const KEYS: &'static [&'static str] = &["OVIRT_LOGROTATE_MAX_SIZE"];

    fn validate(&self) -> Result<()> {
        Validator::number(Some(0), None)
            .optional()
            .check("max_size", self.max_size.as_deref())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![self.max_size.clone()]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            max_size: fields.text(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    pub layout: Option<String>,
}

impl ConfigSection for Keyboard {
    const NAME: &'static str = "Keyboard";
    const KEYS: &'static [&'static str] = &["OVIRT_KEYBOARD_LAYOUT"];

    fn validate(&self) -> Result<()> {
        Validator::NoSpaces
            .optional()
            .check("layout", self.layout.as_deref())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![self.layout.clone()]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            layout: fields.text(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Nfsv4 {
    pub domain: Option<String>,
}

impl ConfigSection for Nfsv4 {
    const NAME: &'static str = "NFSv4";
    const KEYS: &'static [&'static str] = &["OVIRT_NFSV4_DOMAIN"];

    fn validate(&self) -> Result<()> {
        Validator::Fqdn
            .optional()
            .check("domain", self.domain.as_deref())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![self.domain.clone()]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            domain: fields.text(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ssh {
    pub pwauth: bool,
    /// Bytes of entropy sshd reads from the strong RNG
    pub num_bytes: Option<String>,
    pub disable_aesni: bool,
}

impl ConfigSection for Ssh {
    const NAME: &'static str = "SSH";
    const KEYS: &'static [&'static str] = &[
        "OVIRT_SSH_PWAUTH",
        "OVIRT_USE_STRONG_RNG",
        "OVIRT_DISABLE_AES_NI",
    ];

    fn validate(&self) -> Result<()> {
        Validator::number(Some(0), None)
            .optional()
            .check("num_bytes", self.num_bytes.as_deref())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            flag_value(self.pwauth, "yes"),
            self.num_bytes.clone(),
            flag_value(self.disable_aesni, "true"),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            pwauth: fields.flag(),
            num_bytes: fields.text(),
            disable_aesni: fields.flag(),
        }
    }
}
