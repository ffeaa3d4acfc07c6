// SPDX-License-Identifier: GPL-3.0-only

//! Persisted node settings
//!
//! [`ConfigStore`] wraps the flat `/etc/default/ovirt` file. Typed
//! [`ConfigSection`]s map fixed groups of keys to structured values and
//! validate them before anything is written.

pub mod error;
pub mod section;
pub mod sections;
pub mod store;
pub mod valid;

pub use error::{ConfigError, Result};
pub use section::{ConfigSection, Fields};
pub use store::{ConfigStore, DEFAULTS_FILE};
pub use valid::Validator;
