// SPDX-License-Identifier: GPL-3.0-only

//! ovirt-node-setup - configure an oVirt Node from the command line

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use node_config::ConfigStore;
use node_setup::settings::SETTINGS_FILE;
use node_setup::{Changes, NodeContext, NodePaths, PageRegistry};
use node_storage::{mem_total_mb, storage_auto};
use node_sys::{PersistentStore, SystemRunner};
use node_transaction::TransactionLock;

mod logging;

#[derive(Debug, Parser)]
#[command(name = "ovirt-node-setup")]
#[command(about = "Configure storage, network and services of an oVirt Node")]
struct SetupCli {
    /// Runtime paths and logging settings
    #[arg(long, default_value = SETTINGS_FILE)]
    settings: PathBuf,

    #[command(subcommand)]
    command: SetupCommand,
}

#[derive(Debug, Subcommand)]
enum SetupCommand {
    /// List installation candidate disks as JSON
    Devices,
    /// List configuration pages
    Pages,
    /// Show the settings of a page as JSON
    Show { page: String },
    /// Change settings of a page and apply them
    Set {
        page: String,
        #[arg(value_parser = parse_change, required = true)]
        changes: Vec<(String, String)>,
    },
    /// Unattended storage installation from the stored settings
    Install,
    /// Persist files across reboots
    Persist {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Stop persisting files
    Unpersist {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Compare the persistence manifest with the active bind mounts
    Audit,
}

impl SetupCommand {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Self::Set { .. } | Self::Install | Self::Persist { .. } | Self::Unpersist { .. }
        )
    }
}

fn parse_change(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn main() -> Result<()> {
    let cli = SetupCli::parse();
    let paths = NodePaths::load(&cli.settings)?;
    logging::init(&paths);

    if cli.command.mutates() && unsafe { libc::geteuid() } != 0 {
        tracing::error!("ovirt-node-setup must run as root to change settings");
        anyhow::bail!("This command requires root privileges");
    }

    let runner = SystemRunner;
    let persist = PersistentStore::with_paths(&runner, paths.persist_paths());
    let store = ConfigStore::new(paths.defaults_file.clone());
    let ctx = NodeContext::new(&runner, &persist, &store, &paths);
    let registry = PageRegistry::build_default()?;

    match cli.command {
        SetupCommand::Devices => {
            let devices = ctx.storage.catalog().list_devices();
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
        SetupCommand::Pages => {
            for page in registry.pages() {
                println!("{}", page.name());
            }
        }
        SetupCommand::Show { page } => {
            let model = registry.get(&page)?.model(&store)?;
            println!("{}", serde_json::to_string_pretty(&model)?);
        }
        SetupCommand::Set { page, changes } => {
            let changes: Changes = changes.into_iter().collect();
            let lock = TransactionLock::new(paths.lock_file.clone());
            registry
                .apply(&ctx, &page, &changes, &lock)
                .with_context(|| format!("applying settings of page {page}"))?;
            tracing::info!("Settings of page {} applied", page);
        }
        SetupCommand::Install => {
            let mem_mb = mem_total_mb()?;
            if !storage_auto(&ctx.storage, &store, mem_mb) {
                anyhow::bail!("Storage installation failed, see the log for details");
            }
            tracing::info!("Storage installation finished");
        }
        SetupCommand::Persist { paths: files } => {
            for file in files {
                let outcome = persist
                    .persist(&file)
                    .with_context(|| format!("persisting {file}"))?;
                println!("{file}: {outcome:?}");
            }
        }
        SetupCommand::Unpersist { paths: files } => {
            for file in files {
                if !persist
                    .unpersist(&file)
                    .with_context(|| format!("unpersisting {file}"))?
                {
                    println!("{file}: not persisted");
                }
            }
        }
        SetupCommand::Audit => {
            let audit = persist.audit()?;
            println!("{}", serde_json::to_string_pretty(&audit)?);
            if !audit.is_clean() {
                anyhow::bail!("Persistence manifest and bind mounts disagree");
            }
        }
    }
    Ok(())
}
