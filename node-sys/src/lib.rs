// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for node configuration
//!
//! This crate wraps everything that touches the host directly:
//! - Structured external command execution (`parted`, `lvm`, `multipath`, ...)
//! - Block device discovery and multipath canonicalization
//! - LVM inspection and foreign volume group removal
//! - Mount table parsing
//! - Atomic file writes and backups
//! - Persistence of files into the `/config` overlay
//!
//! Every external command goes through a [`CommandRunner`] so callers can
//! substitute a scripted runner in tests.

pub mod cmd;
pub mod devices;
pub mod error;
pub mod fs;
pub mod lvm;
pub mod mounts;
pub mod persist;

pub use cmd::{CommandOutcome, CommandRunner, CommandSpec, SystemRunner};
pub use devices::{CatalogPaths, DeviceCatalog};
pub use lvm::LvmTools;
pub use error::{Result, SysError};
pub use persist::{PersistOutcome, PersistPaths, PersistenceAudit, PersistentStore};
