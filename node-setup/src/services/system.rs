// SPDX-License-Identifier: GPL-3.0-only

use std::sync::LazyLock;

use node_config::sections::{Collectd, Iscsi, Keyboard, Nfsv4, Ssh};
use node_sys::fs::{atomic_write, read_optional};
use node_transaction::Transaction;
use regex::Regex;
use tracing::{debug, info};

use crate::context::NodeContext;
use crate::files::{replace_lines, set_export};
use crate::{Result, SetupError};

const COLLECTD_CONF: &str = "/etc/collectd.conf";
const VCONSOLE_CONF: &str = "/etc/vconsole.conf";
const SYSCONFIG_KEYBOARD: &str = "/etc/sysconfig/keyboard";
const IDMAPD_CONF: &str = "/etc/idmapd.conf";
const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";
const PROFILE: &str = "/etc/profile";

static IDMAPD_DOMAIN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^#?\s*(Domain\s*=.*)$").ok());
static SSHD_PASSWORD_AUTH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*#?\s*PasswordAuthentication\s").ok());

fn matches(regex: &LazyLock<Option<Regex>>, line: &str) -> bool {
    regex.as_ref().is_some_and(|re| re.is_match(line))
}

pub fn iscsi<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let section: Iscsi = ctx.store.retrieve_section()?;
    let name = section.name;

    let mut tx = Transaction::new("Configuring the iSCSI Initiator");
    tx.push_fn("Setting the iSCSI initiator name", move || {
        match &name {
            Some(name) => ctx.storage.set_iscsi_initiator(name)?,
            None => debug!("No initiator name configured"),
        }
        Ok(())
    });
    Ok(tx)
}

pub fn collectd<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let Collectd { server, port } = ctx.store.retrieve_section()?;

    let mut tx = Transaction::new("Configuring collectd");
    tx.push_fn("Setting collect server and port", move || {
        let template = ctx.live(&format!("{COLLECTD_CONF}.in"));
        if let Some(template) = read_optional(&template)? {
            let config = template
                .replace("@COLLECTD_SERVER@", server.as_deref().unwrap_or_default())
                .replace("@COLLECTD_PORT@", port.as_deref().unwrap_or_default());
            atomic_write(&ctx.live(COLLECTD_CONF), &config)?;
        }
        ctx.run("chkconfig", &["collectd", "on"]);
        if !ctx.service("collectd", "restart") {
            return Err(SetupError::Failed("Failed to configure collectd".to_string()).into());
        }
        ctx.persist_file(COLLECTD_CONF);
        info!("Collectd was configured successfully");
        Ok(())
    });
    Ok(tx)
}

pub fn keyboard<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let Keyboard { layout } = ctx.store.retrieve_section()?;

    let mut tx = Transaction::new("Configuring keyboard layout");
    tx.push_fn("Setting keyboard layout", move || {
        let Some(layout) = &layout else {
            debug!("No keyboard layout configured");
            return Ok(());
        };
        ctx.run("localectl", &["set-keymap", layout.as_str()]);
        for path in [VCONSOLE_CONF, SYSCONFIG_KEYBOARD] {
            if ctx.live(path).exists() {
                ctx.persist_file(path);
            }
        }
        Ok(())
    });
    Ok(tx)
}

/// `Domain = <domain>`, or the existing directive commented out.
pub fn idmapd_with_domain(content: &str, domain: Option<&str>) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut seen = false;
    for line in content.lines() {
        let directive = IDMAPD_DOMAIN
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        match (directive, domain) {
            (Some(_), Some(domain)) => {
                seen = true;
                out.push(format!("Domain = {domain}"));
            }
            (Some(directive), None) => {
                seen = true;
                out.push(format!("#{directive}"));
            }
            (None, _) => out.push(line.to_string()),
        }
    }
    if let (false, Some(domain)) = (seen, domain) {
        out.push(format!("Domain = {domain}"));
    }
    out.join("\n") + "\n"
}

pub fn nfsv4<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let Nfsv4 { domain } = ctx.store.retrieve_section()?;

    let mut tx = Transaction::new("Configuring NFSv4");
    tx.push_fn("Setting NFSv4 domain", move || {
        let path = ctx.live(IDMAPD_CONF);
        let current = read_optional(&path)?.unwrap_or_default();
        atomic_write(&path, &idmapd_with_domain(&current, domain.as_deref()))?;
        ctx.persist_file(IDMAPD_CONF);
        ctx.service("rpcidmapd", "restart");
        ctx.run("nfsidmap", &["-c"]);
        Ok(())
    });
    Ok(tx)
}

pub fn ssh<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let Ssh {
        pwauth,
        num_bytes,
        disable_aesni,
    } = ctx.store.retrieve_section()?;

    let mut tx = Transaction::new("Configuring SSH");
    tx.push_fn("Configuring SSH password authentication", move || {
        let value = if pwauth { "yes" } else { "no" };
        debug!("Setting SSH PasswordAuthentication to {}", value);
        let line = format!("PasswordAuthentication {value}");
        replace_lines(
            &ctx.live(SSHD_CONFIG),
            |current| matches(&SSHD_PASSWORD_AUTH, current),
            Some(&line),
        )?;
        ctx.persist_file(SSHD_CONFIG);
        ctx.service("sshd", "restart");
        Ok(())
    });
    tx.push_fn("Configuring SSH strong RNG", move || {
        set_export(&ctx.live(PROFILE), "SSH_USE_STRONG_RNG", num_bytes.as_deref())?;
        Ok(())
    });
    tx.push_fn("Configuring SSH AES NI", move || {
        let flag = disable_aesni.then_some("1");
        set_export(&ctx.live(PROFILE), "OPENSSL_DISABLE_AES_NI", flag)?;
        ctx.persist_file(PROFILE);
        ctx.service("sshd", "restart");
        Ok(())
    });
    Ok(tx)
}
