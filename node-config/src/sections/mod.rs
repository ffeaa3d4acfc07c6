// SPDX-License-Identifier: GPL-3.0-only

//! Every settings section known to the node

mod install;
mod network;
mod services;

pub use install::{Installation, Management, VolumeRequest};
pub use network::{Ipv6, Network, NetworkTopology, NicBonding};
pub use services::{
    Collectd, Hostname, Iscsi, KDump, Keyboard, Logrotate, Nameservers, Netconsole, Nfsv4, Ssh,
    Syslog, Timeservers,
};
