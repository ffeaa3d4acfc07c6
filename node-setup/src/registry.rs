// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;

use node_config::ConfigStore;
use node_config::sections::Management;
use node_transaction::{LockGuard, Transaction, TransactionLock};
use tracing::{error, info, warn};

use crate::context::NodeContext;
use crate::pages::{self, Changes, ConfigurationPage};
use crate::{Result, SetupError};

pub const REQUIRED_PAGES: [&str; 9] = [
    "network",
    "storage",
    "kdump",
    "keyboard",
    "logging",
    "monitoring",
    "remote-storage",
    "security",
    "management",
];

/// Every configuration page of the node, built once at startup
pub struct PageRegistry {
    pages: BTreeMap<&'static str, Box<dyn ConfigurationPage>>,
}

impl PageRegistry {
    pub fn build_default() -> Result<Self> {
        let list: Vec<Box<dyn ConfigurationPage>> = vec![
            Box::new(pages::network::page()),
            Box::new(pages::storage::page()),
            Box::new(pages::services::kdump_page()),
            Box::new(pages::services::keyboard_page()),
            Box::new(pages::services::logging_page()),
            Box::new(pages::services::monitoring_page()),
            Box::new(pages::services::remote_storage_page()),
            Box::new(pages::services::security_page()),
            Box::new(pages::management::page()),
        ];
        Self::from_pages(list)
    }

    /// Fails when a page name is used twice or a required page is missing.
    pub fn from_pages(list: Vec<Box<dyn ConfigurationPage>>) -> Result<Self> {
        let mut pages = BTreeMap::new();
        for page in list {
            let name = page.name();
            if pages.insert(name, page).is_some() {
                return Err(SetupError::DuplicatePage(name.to_string()));
            }
        }

        let missing: Vec<String> = REQUIRED_PAGES
            .iter()
            .filter(|name| !pages.contains_key(*name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SetupError::MissingPages(missing));
        }

        Ok(Self { pages })
    }

    /// Pages ordered by rank.
    pub fn pages(&self) -> Vec<&dyn ConfigurationPage> {
        let mut pages: Vec<&dyn ConfigurationPage> =
            self.pages.values().map(|page| page.as_ref()).collect();
        pages.sort_by_key(|page| (page.rank(), page.name()));
        pages
    }

    pub fn get(&self, name: &str) -> Result<&dyn ConfigurationPage> {
        self.pages
            .get(name)
            .map(|page| page.as_ref())
            .ok_or_else(|| SetupError::UnknownPage(name.to_string()))
    }

    /// Pages the management system has locked.
    pub fn locked_pages(store: &ConfigStore) -> Result<Vec<String>> {
        let management: Management = store.retrieve_section()?;
        Ok(management
            .managed_locked_pages
            .map(|pages| {
                pages
                    .split(',')
                    .map(str::trim)
                    .filter(|page| !page.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Take the lock, merge `changes` into page `name` and run the resulting
    /// transaction. The settings store is put back as it was when merging or
    /// the transaction fails.
    pub fn apply(
        &self,
        ctx: &NodeContext<'_>,
        name: &str,
        changes: &Changes,
        lock: &TransactionLock,
    ) -> Result<()> {
        let guard = lock.acquire()?;
        let saved = ctx.store.load()?;

        let result = self
            .merge(ctx, name, changes, &guard)
            .and_then(|tx| Ok(tx.run_locked(&guard)?));
        if let Err(e) = &result {
            warn!("Applying page {} failed, restoring settings: {}", name, e);
            if let Err(restore) = ctx.store.replace(&saved) {
                error!("Could not restore settings of page {}: {}", name, restore);
            }
        }
        result
    }

    /// Validate, store and build the transaction for `changes` on `name`.
    ///
    /// The store is written right away, so the caller holds the lock.
    pub fn merge<'a>(
        &self,
        ctx: &'a NodeContext<'a>,
        name: &str,
        changes: &Changes,
        _guard: &LockGuard,
    ) -> Result<Transaction<'a>> {
        let page = self.get(name)?;
        if Self::locked_pages(ctx.store)?.iter().any(|locked| locked == name) {
            let management: Management = ctx.store.retrieve_section()?;
            return Err(SetupError::Locked {
                page: name.to_string(),
                managed_by: management
                    .managed_by
                    .unwrap_or_else(|| "the management system".to_string()),
            });
        }
        info!("Merging {} change(s) into page {}", changes.len(), name);
        page.on_merge(ctx, changes)
    }
}
