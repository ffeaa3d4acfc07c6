// SPDX-License-Identifier: GPL-3.0-only

use node_config::sections::Management;
use node_transaction::Transaction;

use crate::context::NodeContext;
use crate::pages::{Binding, SectionsPage};
use crate::Result;

pub const NAME: &str = "management";

/// Written by the management system, shown here only.
pub fn page() -> SectionsPage {
    SectionsPage::new(NAME, 90, vec![Binding::section::<Management>(nothing)]).read_only()
}

fn nothing<'a>(_ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    Ok(Transaction::new("Management settings"))
}
