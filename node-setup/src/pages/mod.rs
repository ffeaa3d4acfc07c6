// SPDX-License-Identifier: GPL-3.0-only

//! Configuration pages
//!
//! A page groups the sections of one settings domain. Changes arrive as raw
//! `KEY=value` pairs, are validated against the merged section, written to
//! the settings store and turned into the transaction that applies them.

use std::collections::BTreeMap;

use node_config::valid::parse_bool;
use node_config::{ConfigError, ConfigSection, ConfigStore, Fields};
use node_transaction::Transaction;
use tracing::debug;

use crate::context::NodeContext;
use crate::{Result, SetupError};

pub mod management;
pub mod network;
pub mod services;
pub mod storage;

/// Raw changes keyed by settings key; an empty value removes the key.
pub type Changes = BTreeMap<String, String>;

/// Builds the transaction applying one group of sections.
pub type Builder = for<'a> fn(&'a NodeContext<'a>) -> Result<Transaction<'a>>;

pub trait ConfigurationPage {
    fn name(&self) -> &'static str;

    /// Position in page listings, lowest first
    fn rank(&self) -> u32;

    fn keys(&self) -> Vec<&'static str>;

    /// Current value of every key; absent keys map to an empty string.
    fn model(&self, store: &ConfigStore) -> Result<BTreeMap<String, String>> {
        let current = store.load()?;
        Ok(self
            .keys()
            .into_iter()
            .map(|key| (key.to_string(), current.get(key).cloned().unwrap_or_default()))
            .collect())
    }

    /// Reject changes without touching the store.
    fn validate(&self, store: &ConfigStore, changes: &Changes) -> Result<()>;

    /// Write `changes` to the store and return the transaction applying
    /// them. Called with the transaction lock held.
    fn on_merge<'a>(
        &self,
        ctx: &'a NodeContext<'a>,
        changes: &Changes,
    ) -> Result<Transaction<'a>>;
}

/// Type-erased operations on one [`ConfigSection`]
#[derive(Clone, Copy)]
pub struct SectionOps {
    pub name: &'static str,
    pub keys: &'static [&'static str],
    validate: fn(&ConfigStore, &Changes) -> Result<()>,
    merge: fn(&ConfigStore, &Changes) -> Result<()>,
}

impl SectionOps {
    pub fn of<S: ConfigSection>() -> Self {
        Self {
            name: S::NAME,
            keys: S::KEYS,
            validate: |store, changes| merged::<S>(store, changes).map(|_| ()),
            merge: |store, changes| {
                let section = merged::<S>(store, changes)?;
                store.update_section(&section)?;
                Ok(())
            },
        }
    }

    fn touched_by(&self, changes: &Changes) -> bool {
        self.keys.iter().any(|key| changes.contains_key(*key))
    }
}

/// The stored section overlaid with `changes`.
///
/// Values the section cannot represent are rejected here rather than
/// silently dropped on decode.
fn merged<S: ConfigSection>(store: &ConfigStore, changes: &Changes) -> Result<S> {
    let current = store.load()?;
    let values: Vec<Option<String>> = S::KEYS
        .iter()
        .map(|key| {
            changes
                .get(*key)
                .or_else(|| current.get(*key))
                .filter(|value| !value.is_empty())
                .cloned()
        })
        .collect();

    let section = S::decode(&mut Fields::new(values));
    for (key, encoded) in S::KEYS.iter().zip(section.encode()) {
        let Some(requested) = changes.get(*key).filter(|value| !value.is_empty()) else {
            continue;
        };
        if encoded.is_none() && parse_bool(requested).is_none() {
            return Err(ConfigError::invalid(*key, requested.as_str(), "a supported value").into());
        }
    }
    section.validate()?;
    Ok(section)
}

/// Sections applied together by one transaction
pub struct Binding {
    sections: Vec<SectionOps>,
    build: Builder,
}

impl Binding {
    pub fn section<S: ConfigSection>(build: Builder) -> Self {
        Self::sections(vec![SectionOps::of::<S>()], build)
    }

    pub fn sections(sections: Vec<SectionOps>, build: Builder) -> Self {
        Self { sections, build }
    }

    fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sections
            .iter()
            .flat_map(|section| section.keys.iter().copied())
    }

    fn touched_by(&self, changes: &Changes) -> bool {
        self.sections
            .iter()
            .any(|section| section.touched_by(changes))
    }
}

/// Page made of section bindings
pub struct SectionsPage {
    name: &'static str,
    rank: u32,
    bindings: Vec<Binding>,
    read_only: bool,
}

impl SectionsPage {
    pub fn new(name: &'static str, rank: u32, bindings: Vec<Binding>) -> Self {
        Self {
            name,
            rank,
            bindings,
            read_only: false,
        }
    }

    /// Shown, never changed.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl ConfigurationPage for SectionsPage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn rank(&self) -> u32 {
        self.rank
    }

    fn keys(&self) -> Vec<&'static str> {
        self.bindings.iter().flat_map(Binding::keys).collect()
    }

    fn validate(&self, store: &ConfigStore, changes: &Changes) -> Result<()> {
        if self.read_only && !changes.is_empty() {
            return Err(SetupError::ReadOnly(self.name.to_string()));
        }

        let keys = self.keys();
        if let Some(key) = changes.keys().find(|key| !keys.contains(&key.as_str())) {
            return Err(SetupError::UnknownKey {
                page: self.name.to_string(),
                key: key.clone(),
            });
        }

        for section in self
            .bindings
            .iter()
            .flat_map(|binding| binding.sections.iter())
            .filter(|section| section.touched_by(changes))
        {
            debug!("Validating section {} of page {}", section.name, self.name);
            (section.validate)(store, changes)?;
        }
        Ok(())
    }

    fn on_merge<'a>(
        &self,
        ctx: &'a NodeContext<'a>,
        changes: &Changes,
    ) -> Result<Transaction<'a>> {
        self.validate(ctx.store, changes)?;

        let touched: Vec<&Binding> = self
            .bindings
            .iter()
            .filter(|binding| binding.touched_by(changes))
            .collect();

        for section in touched
            .iter()
            .flat_map(|binding| binding.sections.iter())
            .filter(|section| section.touched_by(changes))
        {
            (section.merge)(ctx.store, changes)?;
        }

        let mut tx = Transaction::new(format!("Applying {} settings", self.name));
        for binding in touched {
            tx.append((binding.build)(ctx)?);
        }
        Ok(tx)
    }
}
