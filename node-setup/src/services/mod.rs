// SPDX-License-Identifier: GPL-3.0-only

//! Transactions applying the stored settings to the host
//!
//! Every builder reads its section when it is called, so a page merges the
//! new values into the store first and builds the transaction afterwards.

pub mod kdump;
pub mod logging;
pub mod network;
pub mod system;
