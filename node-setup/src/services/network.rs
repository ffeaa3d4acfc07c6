// SPDX-License-Identifier: GPL-3.0-only

use node_config::sections::{Hostname, Nameservers, Timeservers};
use node_sys::fs::{atomic_write, read_optional};
use node_transaction::Transaction;
use tracing::{debug, info};

use crate::context::NodeContext;
use crate::files::set_shell_vars;
use crate::{Result, SetupError};

const HOSTS: &str = "/etc/hosts";
const HOSTNAME_FILE: &str = "/etc/hostname";
const SYSCONFIG_NETWORK: &str = "/etc/sysconfig/network";
const RESOLV_CONF: &str = "/etc/resolv.conf";
const NTP_CONF: &str = "/etc/ntp.conf";

const RESOLV_COMMENT: &str = "# Please make changes through the TUI or management server. \
                              Manual edits to this file will be lost on reboot";

pub fn hostname<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let section: Hostname = ctx.store.retrieve_section()?;
    let hostname = section.hostname;

    let mut tx = Transaction::new("Configuring hostname");
    tx.push_fn("Setting hostname", move || {
        set_hostname(ctx, hostname.as_deref())?;
        Ok(())
    });
    Ok(tx)
}

fn set_hostname(ctx: &NodeContext<'_>, hostname: Option<&str>) -> Result<()> {
    let hosts_path = ctx.live(HOSTS);
    let hosts = read_optional(&hosts_path)?.unwrap_or_default();
    let mut found = false;
    let mut lines = Vec::new();
    for line in hosts.lines() {
        if line.split_whitespace().next() == Some("127.0.0.1") {
            let mut aliases = vec!["127.0.0.1", "localhost", "localhost.localdomain"];
            aliases.extend(hostname);
            lines.push(aliases.join(" "));
            found = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !found {
        return Err(SetupError::Failed(
            "Couldn't find entry for localhost".to_string(),
        ));
    }
    atomic_write(&hosts_path, &(lines.join("\n") + "\n"))?;

    let name = hostname.unwrap_or("localhost.localdomain");
    atomic_write(&ctx.live(HOSTNAME_FILE), &format!("{name}\n"))?;
    set_shell_vars(&ctx.live(SYSCONFIG_NETWORK), &[("HOSTNAME", Some(name))])?;
    ctx.run("hostname", &[name]);
    info!("Hostname set to {}", name);

    for path in [HOSTS, HOSTNAME_FILE, SYSCONFIG_NETWORK] {
        ctx.persist_file(path);
    }
    Ok(())
}

pub fn nameservers<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let section: Nameservers = ctx.store.retrieve_section()?;
    if section.servers.is_empty() {
        debug!("No DNS server entry in default config");
    }
    let servers = section.servers;
    let manual = !servers.is_empty();

    let mut tx = Transaction::new("Configuring DNS");
    tx.push_fn("Updating resolv.conf", move || {
        write_resolv_conf(ctx, &servers)?;
        Ok(())
    });
    tx.push_fn("Update PEERDNS statement in ifcfg-* files", move || {
        ctx.network.update_peerdns(manual)?;
        Ok(())
    });
    Ok(tx)
}

/// Written even without servers so the comment is always present.
fn write_resolv_conf(ctx: &NodeContext<'_>, servers: &[String]) -> Result<()> {
    let path = ctx.live(RESOLV_CONF);
    let current = read_optional(&path)?.unwrap_or_default();

    let mut lines = vec![RESOLV_COMMENT.to_string()];
    lines.extend(
        current
            .lines()
            .filter(|line| {
                let line = line.trim_start();
                !line.starts_with('#') && !line.starts_with("nameserver")
            })
            .map(str::to_string),
    );
    lines.extend(servers.iter().map(|server| format!("nameserver {server}")));

    atomic_write(&path, &(lines.join("\n") + "\n"))?;
    ctx.persist_file(RESOLV_CONF);
    Ok(())
}

pub fn timeservers<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let section: Timeservers = ctx.store.retrieve_section()?;
    let servers = section.servers;

    let mut tx = Transaction::new("Configuring timeservers");
    tx.push_fn("Writing timeserver configuration", move || {
        let mut conf = String::from(
            "driftfile /var/lib/ntp/drift\n\
             includefile /etc/ntp/crypto/pw\n\
             keys /etc/ntp/keys\n",
        );
        for server in &servers {
            conf.push_str(&format!("server {server}\n"));
        }
        atomic_write(&ctx.live(NTP_CONF), &conf)?;
        ctx.persist_file(NTP_CONF);
        Ok(())
    });
    tx.push_fn("Restarting time services", move || {
        ctx.service("ntpd", "stop");
        ctx.service("ntpdate", "start");
        ctx.service("ntpd", "start");
        Ok(())
    });
    Ok(tx)
}
