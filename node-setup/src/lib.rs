// SPDX-License-Identifier: GPL-3.0-only

//! Configuration pages of oVirt Node
//!
//! Each page groups the settings of one domain (network, storage, kdump,
//! ...) and turns submitted changes into a transaction that applies them
//! to the host. [`PageRegistry`] holds the fixed set of pages.

pub mod context;
pub mod error;
pub mod files;
pub mod pages;
pub mod registry;
pub mod services;
pub mod settings;

pub use context::NodeContext;
pub use error::{Result, SetupError};
pub use pages::{Changes, ConfigurationPage};
pub use registry::{PageRegistry, REQUIRED_PAGES};
pub use settings::{LoggingLevel, NodePaths};
