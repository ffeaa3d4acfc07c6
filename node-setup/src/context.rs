// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use node_config::ConfigStore;
use node_network::NetworkProvisioner;
use node_storage::{StoragePaths, StorageProvisioner};
use node_sys::cmd::tool_available;
use node_sys::{CatalogPaths, CommandRunner, CommandSpec, DeviceCatalog, LvmTools, PersistentStore};
use tracing::{debug, warn};

use crate::settings::NodePaths;

/// Everything a page transaction touches on the host
pub struct NodeContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub persist: &'a PersistentStore<'a>,
    pub store: &'a ConfigStore,
    pub network: NetworkProvisioner<'a>,
    pub storage: StorageProvisioner<'a>,
    root: PathBuf,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        persist: &'a PersistentStore<'a>,
        store: &'a ConfigStore,
        paths: &NodePaths,
    ) -> Self {
        let root = paths.root.clone();
        let catalog = DeviceCatalog::with_paths(
            runner,
            CatalogPaths {
                sys_block: root.join("sys/block"),
                dev_by_id: root.join("dev/disk/by-id"),
                dev_cciss: root.join("dev/cciss"),
            },
        );
        let storage = StorageProvisioner::new(runner, persist)
            .with_catalog(catalog)
            .with_lvm(LvmTools::with_mountinfo(runner, paths.mountinfo.clone()))
            .with_paths(StoragePaths::new(root.clone()));
        let network = NetworkProvisioner::new(runner, persist, store).with_root(&root);

        Self {
            runner,
            persist,
            store,
            network,
            storage,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `absolute` below the configured root.
    pub fn live(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }

    /// Persist `path`, logging instead of failing.
    pub fn persist_file(&self, path: &str) {
        if let Err(e) = self.persist.persist(path) {
            warn!("Could not persist {}: {}", path, e);
        }
    }

    pub fn service(&self, name: &str, action: &str) -> bool {
        let ok = self
            .runner
            .succeeds(&CommandSpec::new("service").args([name, action]));
        if !ok {
            debug!("service {} {} failed", name, action);
        }
        ok
    }

    pub fn run(&self, program: &str, args: &[&str]) -> bool {
        self.runner
            .succeeds(&CommandSpec::new(program).args(args.iter().copied()))
    }

    /// Whether `program` is installed on the configured root.
    pub fn has_tool(&self, program: &str) -> bool {
        if self.root == Path::new("/") {
            return tool_available(program);
        }
        ["/usr/bin", "/usr/sbin", "/bin", "/sbin"]
            .iter()
            .any(|dir| self.live(&format!("{dir}/{program}")).exists())
    }
}
