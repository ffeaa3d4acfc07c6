// SPDX-License-Identifier: GPL-3.0-only

//! Installation target and volume sizes
//!
//! Merging only checks the selection against the disks; partitioning is
//! started separately by the installer.

use node_config::sections::Installation;
use node_storage::{StorageError, StoragePlan, mem_total_mb};
use node_transaction::Transaction;
use tracing::{debug, info};

use crate::context::NodeContext;
use crate::pages::{Binding, SectionsPage};
use crate::Result;

pub const NAME: &str = "storage";

pub fn page() -> SectionsPage {
    SectionsPage::new(NAME, 20, vec![Binding::section::<Installation>(check)])
}

fn check<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let mut tx = Transaction::new("Checking installation settings");
    tx.push_fn("Checking target devices and volume sizes", move || {
        check_selection(ctx)?;
        Ok(())
    });
    Ok(tx)
}

/// Nondestructive part of the storage validation.
fn check_selection(ctx: &NodeContext<'_>) -> Result<()> {
    let installation: Installation = ctx.store.retrieve_section()?;
    if installation.init.is_empty() {
        debug!("No installation target selected");
        return Ok(());
    }

    let plan = StoragePlan::from_store(ctx.store, ctx.storage.catalog(), mem_total_mb()?)?;
    let overlap = plan.overlapping_devices();
    if !overlap.is_empty() {
        return Err(StorageError::VolumeGroupOverlap { devices: overlap }.into());
    }
    ctx.storage.check_partition_sizes(&plan)?;
    info!("Installation target {} is usable", installation.init.join(","));
    Ok(())
}
