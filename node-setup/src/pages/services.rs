// SPDX-License-Identifier: GPL-3.0-only

use node_config::sections::{Collectd, Iscsi, KDump, Keyboard, Logrotate, Netconsole, Nfsv4, Ssh, Syslog};

use crate::pages::{Binding, SectionsPage};
use crate::services::{kdump, logging, system};

pub fn kdump_page() -> SectionsPage {
    SectionsPage::new("kdump", 30, vec![Binding::section::<KDump>(kdump::kdump)])
}

pub fn keyboard_page() -> SectionsPage {
    SectionsPage::new(
        "keyboard",
        40,
        vec![Binding::section::<Keyboard>(system::keyboard)],
    )
}

pub fn logging_page() -> SectionsPage {
    SectionsPage::new(
        "logging",
        50,
        vec![
            Binding::section::<Logrotate>(logging::logrotate),
            Binding::section::<Syslog>(logging::syslog),
            Binding::section::<Netconsole>(logging::netconsole),
        ],
    )
}

pub fn monitoring_page() -> SectionsPage {
    SectionsPage::new(
        "monitoring",
        60,
        vec![Binding::section::<Collectd>(system::collectd)],
    )
}

pub fn remote_storage_page() -> SectionsPage {
    SectionsPage::new(
        "remote-storage",
        70,
        vec![
            Binding::section::<Iscsi>(system::iscsi),
            Binding::section::<Nfsv4>(system::nfsv4),
        ],
    )
}

pub fn security_page() -> SectionsPage {
    SectionsPage::new("security", 80, vec![Binding::section::<Ssh>(system::ssh)])
}
