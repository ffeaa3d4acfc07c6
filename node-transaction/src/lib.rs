// SPDX-License-Identifier: GPL-3.0-only

//! Prepare/commit/abort transactions
//!
//! A [`Transaction`] is an ordered list of [`Step`]s, possibly nested. Runs
//! are serialized system wide through a [`TransactionLock`]; a second run
//! fails fast instead of waiting.

pub mod error;
pub mod lock;
pub mod transaction;

pub use error::{Result, StepError, StepResult, TransactionError};
pub use lock::{DEFAULT_LOCK_FILE, LockGuard, TransactionLock};
pub use transaction::{FnStep, Step, Transaction, TransactionSteps};
