// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for oVirt Node configuration
//!
//! These models are shared by every layer of the stack:
//!
//! - **node-sys**: returns `Device` values from the device catalog
//! - **node-config**: stores the network enums in typed sections
//! - **node-storage** / **node-network**: consume them while provisioning
//! - **node-setup**: serializes them for the CLI
//!
//! Parsing from the settings-file spelling goes through `FromStr`, writing
//! goes through `as_str()`, so both directions share one table.

pub mod device;
pub mod network;
pub mod storage;

pub use device::{BusType, Device};
pub use network::{Bootproto, IfcfgRecord, Ipv6Bootproto, NetworkLayout};
pub use storage::{LvSize, PartitionTableType, VolumeGroup, VolumeSizes};

/// Error produced when a settings value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
