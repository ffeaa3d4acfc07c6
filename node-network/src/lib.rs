// SPDX-License-Identifier: GPL-3.0-only

//! Network configuration for oVirt Node
//!
//! Interface records are derived from the settings store by
//! [`plan_interfaces`] and written by the transactions of a
//! [`NetworkProvisioner`]: one that replaces the whole interface layout and
//! one that writes or removes a bond.

pub mod error;
pub mod ifcfg;
pub mod layout;
pub mod nics;
pub mod provisioner;

pub use error::{NetworkError, Result};
pub use ifcfg::IfcfgStore;
pub use layout::{InterfacePlan, NetworkSettings, plan_interfaces};
pub use nics::NicInventory;
pub use provisioner::{NETWORK_SERVICES, NetworkProvisioner};
