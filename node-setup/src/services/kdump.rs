// SPDX-License-Identifier: GPL-3.0-only

use std::cell::RefCell;
use std::rc::Rc;

use node_config::sections::KDump;
use node_sys::CommandSpec;
use node_sys::fs::{BackupFiles, atomic_write};
use node_transaction::Transaction;
use tracing::{info, warn};

use crate::context::NodeContext;
use crate::{Result, SetupError};

const KDUMP_CONF: &str = "/etc/kdump.conf";
const KDUMP_SSH_FILES: [&str; 4] = [
    "/root/.ssh/kdump_id_rsa.pub",
    "/root/.ssh/kdump_id_rsa",
    "/root/.ssh/known_hosts",
    "/root/.ssh/config",
];

pub fn kdump<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let KDump { nfs, ssh, local } = ctx.store.retrieve_section()?;
    let backups = Rc::new(RefCell::new(BackupFiles::new([ctx.live(KDUMP_CONF)])));

    let mut tx = Transaction::new("Configuring kdump");
    let backup = Rc::clone(&backups);
    tx.push_fn("Backing up config files", move || {
        backup.borrow_mut().create()?;
        Ok(())
    });

    if let Some(nfs) = nfs {
        tx.push_fn("Creating kdump NFS config", move || {
            write_net_config(ctx, &nfs)?;
            Ok(())
        });
    } else if let Some(ssh) = ssh {
        tx.push_fn("Creating kdump SSH config", move || {
            write_net_config(ctx, &ssh)?;
            propagate_ssh_key(ctx);
            Ok(())
        });
    } else if local {
        tx.push_fn("Restoring default kdump config", move || {
            atomic_write(
                &ctx.live(KDUMP_CONF),
                "default reboot\next4 /dev/HostVG/Data\npath /core\n",
            )?;
            Ok(())
        });
    } else {
        tx.push_fn("Removing kdump backup", move || {
            ctx.persist.delete(KDUMP_CONF)?;
            ctx.service("kdump", "stop");
            atomic_write(&ctx.live(KDUMP_CONF), "")?;
            backups.borrow().remove()?;
            Ok(())
        });
        return Ok(tx);
    }

    tx.push_fn("Restarting kdump service", move || {
        restart_kdump(ctx, &backups.borrow())?;
        Ok(())
    });
    Ok(tx)
}

fn write_net_config(ctx: &NodeContext<'_>, location: &str) -> Result<()> {
    atomic_write(
        &ctx.live(KDUMP_CONF),
        &format!("default reboot\nnet {location}\n"),
    )?;
    Ok(())
}

fn propagate_ssh_key(ctx: &NodeContext<'_>) {
    let command = if ctx.has_tool("kdumpctl") {
        CommandSpec::new("kdumpctl").arg("propagate")
    } else {
        CommandSpec::new("service").args(["kdump", "propagate"])
    };
    match ctx.runner.check(&command) {
        Ok(_) => {
            for path in KDUMP_SSH_FILES {
                if ctx.live(path).exists() {
                    ctx.persist_file(path);
                }
            }
        }
        Err(e) => warn!("Failed to activate KDump with SSH: {}", e),
    }
}

/// Restores the previous configuration when kdump does not come up.
fn restart_kdump(ctx: &NodeContext<'_>, backups: &BackupFiles) -> Result<()> {
    if !ctx.service("kdump", "restart") {
        info!("Failure while restarting kdump, restoring previous configuration");
        if let Err(e) = ctx.persist.unpersist(KDUMP_CONF) {
            warn!("Could not unpersist {}: {}", KDUMP_CONF, e);
        }
        backups.restore()?;
        ctx.service("kdump", "restart");
        return Err(SetupError::Failed(
            "KDump configuration failed, location unreachable. \
             Previous configuration was restored."
                .to_string(),
        ));
    }

    ctx.persist_file(KDUMP_CONF);
    backups.remove()?;
    Ok(())
}
