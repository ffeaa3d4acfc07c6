// SPDX-License-Identifier: GPL-3.0-only

//! Test support for the node configuration crates
//!
//! - [`ScriptedRunner`]: a fake [`CommandRunner`](node_sys::CommandRunner)
//!   that records invocations and replies with scripted outcomes
//! - [`NodeRoot`]: a temporary filesystem root for file-writing code

pub mod fixtures;
pub mod runner;

pub use fixtures::NodeRoot;
pub use runner::ScriptedRunner;
