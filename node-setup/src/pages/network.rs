// SPDX-License-Identifier: GPL-3.0-only

use node_config::sections::{Hostname, Ipv6, Nameservers, Network, NetworkTopology, NicBonding, Timeservers};
use node_transaction::Transaction;

use crate::context::NodeContext;
use crate::pages::{Binding, SectionOps, SectionsPage};
use crate::services::network::{hostname, nameservers, timeservers};
use crate::Result;

pub const NAME: &str = "network";

pub fn page() -> SectionsPage {
    SectionsPage::new(
        NAME,
        10,
        vec![
            Binding::section::<Hostname>(hostname),
            Binding::section::<Nameservers>(nameservers),
            Binding::section::<Timeservers>(timeservers),
            Binding::sections(
                vec![
                    SectionOps::of::<Network>(),
                    SectionOps::of::<NicBonding>(),
                    SectionOps::of::<NetworkTopology>(),
                    SectionOps::of::<Ipv6>(),
                ],
                interfaces,
            ),
        ],
    )
}

/// Bond first, so the interface records see the final bond state.
fn interfaces<'a>(ctx: &'a NodeContext<'a>) -> Result<Transaction<'a>> {
    let mut tx = Transaction::new("Configuring network interfaces");
    tx.append(ctx.network.bond_transaction()?);
    tx.append(ctx.network.transaction());
    Ok(tx)
}
