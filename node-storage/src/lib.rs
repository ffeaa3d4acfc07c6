// SPDX-License-Identifier: GPL-3.0-only

//! Storage provisioning for oVirt Node
//!
//! A [`StoragePlan`] is computed once from the settings store and handed to
//! a [`StorageProvisioner`], which partitions the root drive, builds the
//! HostVG (and optionally AppVG) volume groups, formats and mounts their
//! volumes and records them in fstab.
//!
//! Partition table changes are never rolled back: once destructive
//! commands have started, a failure leaves the disks as they are and is
//! reported to the caller.

pub mod error;
pub mod plan;
pub mod provisioner;
pub mod swap;
mod volumes;

pub use error::{Result, StorageError};
pub use plan::{IscsiTarget, StoragePlan, cross_check_host_app};
pub use provisioner::{StoragePaths, StorageProvisioner, storage_auto};
pub use swap::{base_swap_size, calculate_swap_size, mem_total_mb};
