// SPDX-License-Identifier: GPL-3.0-only

use node_config::sections::{Logrotate, Netconsole, Syslog};
use node_config::valid::is_ipv6;
use node_sys::fs::{atomic_write, read_optional};
use node_transaction::Transaction;
use tracing::info;

use crate::context::NodeContext;
use crate::files::{replace_lines, set_shell_vars};
use crate::{Result, SetupError};

const RSYSLOG_CONF: &str = "/etc/rsyslog.conf";
const NETCONSOLE: &str = "/etc/sysconfig/netconsole";
const LOGROTATE_NODE: &str = "/etc/logrotate.d/ovirt-node";

const RSYSLOG_TEMPLATE: &str = "
#ovirt rsyslog config file

#### MODULES ####
# provides support for local system logging (e.g. via logger command)
$ModLoad imuxsock.so
# provides kernel logging support (previously done by rklogd)
$ModLoad imklog.so

#### GLOBAL DIRECTIVES ####
# Use default timestamp format
$ActionFileDefaultTemplate RSYSLOG_TraditionalFileFormat

#### RULES ####
# Log anything (except mail) of level info or higher.
# Don't log private authentication messages!
*.info;mail.none;authpriv.none;cron.none                /var/log/messages

# The authpriv file has restricted access.
authpriv.*                                              /var/log/secure

# Log all the mail messages in one place.
mail.*                                                  -/var/log/maillog

# Log cron stuff
cron.*                                                  /var/log/cron

# Everybody gets emergency messages
*.emerg                                                 *

# Save news errors of level crit and higher in a special file.
uucp,news.crit                                          /var/log/spooler

# Save boot messages also to boot.log
local7.*                                                /var/log/boot.log

$WorkDirectory /var/spool/rsyslog
$ActionQueueFileName ovirtNode
$ActionQueueMaxDiskSpace 10m
$ActionQueueSaveOnShutdown on
$ActionQueueType LinkedList
$ActionResumeRetryCount -1
";

/// rsyslog configuration forwarding everything to `server:port` over UDP.
/// Without a server the forwarding rule is commented out.
pub fn rsyslog_config(server: Option<&str>, port: Option<&str>) -> String {
    let (disable, server) = match server {
        Some(server) if is_ipv6(server) => ("", format!("[{server}]")),
        Some(server) => ("", server.to_string()),
        None => ("#", String::new()),
    };
    format!(
        "{}{}*.* @{}:{}\n",
        RSYSLOG_TEMPLATE,
        disable,
        server,
        port.unwrap_or("514")
    )
}

pub fn syslog<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let Syslog { server, port } = ctx.store.retrieve_section()?;

    let mut tx = Transaction::new("Configuring syslog");
    tx.push_fn("Setting syslog server and port", move || {
        let config = rsyslog_config(server.as_deref(), port.as_deref());
        atomic_write(&ctx.live(RSYSLOG_CONF), &config)?;
        ctx.service("rsyslog", "restart");
        ctx.persist_file(RSYSLOG_CONF);
        info!("Syslog configuration updated");
        Ok(())
    });
    Ok(tx)
}

pub fn netconsole<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let Netconsole { server, port } = ctx.store.retrieve_section()?;

    let mut tx = Transaction::new("Configuring netconsole");
    tx.push_fn("Setting netconsole server and port", move || {
        set_shell_vars(
            &ctx.live(NETCONSOLE),
            &[
                ("SYSLOGADDR", server.as_deref()),
                ("SYSLOGPORT", port.as_deref()),
            ],
        )?;
        if !ctx.service("netconsole", "restart") {
            return Err(SetupError::Failed(
                "Failed to restart netconsole service. Is the host resolvable?".to_string(),
            )
            .into());
        }
        ctx.persist_file(NETCONSOLE);
        info!("Netconsole configuration updated");
        Ok(())
    });
    Ok(tx)
}

fn default_logrotate_rule(size_line: &str) -> String {
    format!(
        "/var/log/*.log {{\n    missingok\n    copytruncate\n    rotate 5\n    compress\n    {size_line}\n}}\n"
    )
}

pub fn logrotate<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let Logrotate { max_size } = ctx.store.retrieve_section()?;

    let mut tx = Transaction::new("Configuring logrotate");
    tx.push_fn("Setting logrotate maximum logfile size", move || {
        let path = ctx.live(LOGROTATE_NODE);
        let size_line = max_size.as_deref().map(|size| format!("size {size}k"));
        match (read_optional(&path)?, size_line) {
            (None, Some(size_line)) => atomic_write(&path, &default_logrotate_rule(&size_line))?,
            (None, None) => return Ok(()),
            (Some(_), size_line) => replace_lines(
                &path,
                |line| line.trim_start().starts_with("size "),
                size_line.as_deref().map(|line| format!("    {line}")).as_deref(),
            )?,
        }
        ctx.persist_file(LOGROTATE_NODE);
        Ok(())
    });
    Ok(tx)
}
