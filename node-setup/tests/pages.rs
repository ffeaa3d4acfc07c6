// SPDX-License-Identifier: GPL-3.0-only

use node_config::ConfigStore;
use node_config::sections::Management;
use node_setup::pages::{self, ConfigurationPage};
use node_setup::{Changes, NodeContext, NodePaths, PageRegistry, REQUIRED_PAGES, SetupError};
use node_sys::PersistentStore;
use node_testing::{NodeRoot, ScriptedRunner};
use node_transaction::{TransactionError, TransactionLock};

struct Host {
    node: NodeRoot,
    runner: ScriptedRunner,
    store: ConfigStore,
    paths: NodePaths,
    lock: TransactionLock,
}

impl Host {
    fn new() -> Self {
        let node = NodeRoot::new().unwrap();
        let paths = NodePaths {
            root: node.root().to_path_buf(),
            defaults_file: node.path("/etc/default/ovirt"),
            config_base: node.path("/config"),
            manifest: node.path("/config/files"),
            mountinfo: node.path("/proc/self/mountinfo"),
            lock_file: node.path("/transaction-in-progress"),
            log_file: None,
            ..NodePaths::default()
        };
        Self {
            store: ConfigStore::new(paths.defaults_file.clone()),
            lock: TransactionLock::new(paths.lock_file.clone()),
            runner: ScriptedRunner::new(),
            node,
            paths,
        }
    }

    fn persist(&self) -> PersistentStore<'_> {
        PersistentStore::with_paths(&self.runner, self.paths.persist_paths())
    }
}

fn changes(pairs: &[(&str, &str)]) -> Changes {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn registry_lists_every_page_by_rank() {
    let registry = PageRegistry::build_default().unwrap();
    let names: Vec<&str> = registry.pages().iter().map(|page| page.name()).collect();
    assert_eq!(names, REQUIRED_PAGES);
    assert!(matches!(
        registry.get("snmp"),
        Err(SetupError::UnknownPage(name)) if name == "snmp"
    ));
}

#[test]
fn registry_fails_fast_on_missing_or_duplicate_pages() {
    let only_network: Vec<Box<dyn ConfigurationPage>> = vec![Box::new(pages::network::page())];
    match PageRegistry::from_pages(only_network) {
        Err(SetupError::MissingPages(missing)) => {
            assert_eq!(missing.len(), REQUIRED_PAGES.len() - 1);
            assert!(!missing.contains(&"network".to_string()));
        }
        other => panic!("expected missing pages, got {:?}", other.err()),
    }

    let twice: Vec<Box<dyn ConfigurationPage>> = vec![
        Box::new(pages::network::page()),
        Box::new(pages::network::page()),
    ];
    assert!(matches!(
        PageRegistry::from_pages(twice),
        Err(SetupError::DuplicatePage(name)) if name == "network"
    ));
}

#[test]
fn page_model_lists_all_keys() {
    let host = Host::new();
    host.store
        .update([("OVIRT_SYSLOG_SERVER", Some("10.0.0.6".to_string()))], true)
        .unwrap();

    let registry = PageRegistry::build_default().unwrap();
    let model = registry.get("logging").unwrap().model(&host.store).unwrap();
    assert_eq!(model["OVIRT_SYSLOG_SERVER"], "10.0.0.6");
    assert_eq!(model["OVIRT_SYSLOG_PORT"], "");
    assert!(model.contains_key("OVIRT_LOGROTATE_MAX_SIZE"));
    assert!(model.contains_key("OVIRT_NETCONSOLE_SERVER"));
}

#[test]
fn hostname_is_applied_to_every_file() {
    let host = Host::new();
    host.node
        .write("/etc/hosts", "127.0.0.1 localhost\n::1 localhost6\n")
        .unwrap();
    host.node
        .write("/etc/sysconfig/network", "NETWORKING=yes\n")
        .unwrap();

    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();
    let guard = host.lock.acquire().unwrap();
    let tx = registry
        .merge(
            &ctx,
            "network",
            &changes(&[("OVIRT_HOSTNAME", "node.example.com")]),
            &guard,
        )
        .unwrap();
    assert_eq!(tx.title(), "Applying network settings");
    assert_eq!(tx.step_titles(), vec!["Setting hostname"]);
    tx.run_locked(&guard).unwrap();

    assert_eq!(
        host.node.read("/etc/hosts"),
        "127.0.0.1 localhost localhost.localdomain node.example.com\n::1 localhost6\n"
    );
    assert_eq!(host.node.read("/etc/hostname"), "node.example.com\n");
    let sysconfig = host.node.read("/etc/sysconfig/network");
    assert!(sysconfig.contains("NETWORKING=yes"));
    assert!(sysconfig.contains("HOSTNAME=node.example.com"));
    assert!(host.runner.ran("hostname node.example.com"));
    assert_eq!(
        host.store.get("OVIRT_HOSTNAME").unwrap().as_deref(),
        Some("node.example.com")
    );
}

#[test]
fn invalid_values_leave_the_store_untouched() {
    let host = Host::new();
    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();

    let err = registry
        .apply(&ctx, "network", &changes(&[("OVIRT_HOSTNAME", "not a host!")]), &host.lock)
        .unwrap_err();
    assert!(matches!(err, SetupError::Config(_)));

    let err = registry
        .apply(&ctx, "network", &changes(&[("OVIRT_NETWORK_LAYOUT", "mesh")]), &host.lock)
        .unwrap_err();
    assert!(matches!(err, SetupError::Config(_)));

    let err = registry
        .apply(&ctx, "network", &changes(&[("OVIRT_KDUMP_NFS", "host:/dumps")]), &host.lock)
        .unwrap_err();
    assert!(matches!(err, SetupError::UnknownKey { key, .. } if key == "OVIRT_KDUMP_NFS"));

    assert!(host.store.load().unwrap().is_empty());
    assert!(host.runner.commands().is_empty());
}

#[test]
fn nameservers_update_resolv_conf_and_peerdns() {
    let host = Host::new();
    host.node
        .write("/etc/resolv.conf", "search example.com\nnameserver 192.168.0.1\n")
        .unwrap();
    host.node
        .write("/etc/sysconfig/network-scripts/ifcfg-eth0", "DEVICE=eth0\nONBOOT=yes\n")
        .unwrap();
    host.node
        .write("/etc/sysconfig/network-scripts/ifcfg-lo", "DEVICE=lo\n")
        .unwrap();

    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();
    registry
        .apply(&ctx, "network", &changes(&[("OVIRT_DNS", "10.0.0.2, 10.0.0.3")]), &host.lock)
        .unwrap();

    let resolv = host.node.read("/etc/resolv.conf");
    assert!(resolv.starts_with("# Please make changes through the TUI"));
    assert!(resolv.contains("search example.com"));
    assert!(resolv.contains("nameserver 10.0.0.2\nnameserver 10.0.0.3\n"));
    assert!(!resolv.contains("192.168.0.1"));
    assert!(host
        .node
        .read("/etc/sysconfig/network-scripts/ifcfg-eth0")
        .contains("PEERDNS=no"));
    assert!(!host
        .node
        .read("/etc/sysconfig/network-scripts/ifcfg-lo")
        .contains("PEERDNS"));
    assert_eq!(
        host.store.get("OVIRT_DNS").unwrap().as_deref(),
        Some("10.0.0.2,10.0.0.3")
    );

    registry
        .apply(&ctx, "network", &changes(&[("OVIRT_DNS", "")]), &host.lock)
        .unwrap();
    assert!(!host
        .node
        .read("/etc/sysconfig/network-scripts/ifcfg-eth0")
        .contains("PEERDNS"));
    assert!(!host.node.read("/etc/resolv.conf").contains("nameserver"));
    assert_eq!(host.store.get("OVIRT_DNS").unwrap(), None);
}

#[test]
fn kdump_nfs_target_is_written_and_service_restarted() {
    let host = Host::new();
    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();

    let guard = host.lock.acquire().unwrap();
    let tx = registry
        .merge(
            &ctx,
            "kdump",
            &changes(&[("OVIRT_KDUMP_NFS", "dumps.example.com:/kdump")]),
            &guard,
        )
        .unwrap();
    assert_eq!(
        tx.step_titles(),
        vec![
            "Backing up config files",
            "Creating kdump NFS config",
            "Restarting kdump service"
        ]
    );
    tx.run_locked(&guard).unwrap();

    assert_eq!(
        host.node.read("/etc/kdump.conf"),
        "default reboot\nnet dumps.example.com:/kdump\n"
    );
    assert!(host.runner.ran("service kdump restart"));
}

#[test]
fn unreachable_kdump_target_restores_previous_config() {
    let host = Host::new();
    host.node
        .write("/etc/kdump.conf", "default reboot\next4 /dev/HostVG/Data\npath /core\n")
        .unwrap();
    host.runner.fail("service kdump restart", "network unreachable");

    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();
    let err = registry
        .apply(
            &ctx,
            "kdump",
            &changes(&[("OVIRT_KDUMP_SSH", "root@dumps.example.com")]),
            &host.lock,
        )
        .unwrap_err();

    assert!(err.to_string().contains("Previous configuration was restored"));
    assert_eq!(
        host.node.read("/etc/kdump.conf"),
        "default reboot\next4 /dev/HostVG/Data\npath /core\n"
    );
    assert!(host.runner.ran("service kdump propagate"));
    assert_eq!(host.runner.count("service kdump restart"), 2);
    assert_eq!(host.store.get("OVIRT_KDUMP_SSH").unwrap(), None);
}

#[test]
fn ssh_settings_edit_sshd_config_and_profile() {
    let host = Host::new();
    host.node
        .write("/etc/ssh/sshd_config", "#PasswordAuthentication yes\nUsePAM yes\n")
        .unwrap();
    host.node
        .write("/etc/profile", "export PATH\nexport OPENSSL_DISABLE_AES_NI=1\n")
        .unwrap();

    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();
    registry
        .apply(
            &ctx,
            "security",
            &changes(&[("OVIRT_SSH_PWAUTH", "yes"), ("OVIRT_USE_STRONG_RNG", "32")]),
            &host.lock,
        )
        .unwrap();

    assert_eq!(
        host.node.read("/etc/ssh/sshd_config"),
        "PasswordAuthentication yes\nUsePAM yes\n"
    );
    let profile = host.node.read("/etc/profile");
    assert!(profile.contains("export SSH_USE_STRONG_RNG=32"));
    assert!(!profile.contains("OPENSSL_DISABLE_AES_NI"));
    assert!(host.runner.ran("service sshd restart"));
}

#[test]
fn syslog_and_netconsole() {
    let host = Host::new();
    host.runner
        .fail("service netconsole restart", "unknown host");

    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();
    registry
        .apply(
            &ctx,
            "logging",
            &changes(&[("OVIRT_SYSLOG_SERVER", "10.0.0.6"), ("OVIRT_SYSLOG_PORT", "514")]),
            &host.lock,
        )
        .unwrap();
    assert!(host
        .node
        .read("/etc/rsyslog.conf")
        .ends_with("\n*.* @10.0.0.6:514\n"));
    assert!(host.runner.ran("service rsyslog restart"));

    let err = registry
        .apply(
            &ctx,
            "logging",
            &changes(&[
                ("OVIRT_NETCONSOLE_SERVER", "10.0.0.9"),
                ("OVIRT_NETCONSOLE_PORT", "6666"),
            ]),
            &host.lock,
        )
        .unwrap_err();
    assert!(err.to_string().contains("Is the host resolvable?"));
    let netconsole = host.node.read("/etc/sysconfig/netconsole");
    assert!(netconsole.contains("SYSLOGADDR=10.0.0.9"));
    assert!(netconsole.contains("SYSLOGPORT=6666"));
    assert_eq!(host.store.get("OVIRT_NETCONSOLE_SERVER").unwrap(), None);
    assert_eq!(
        host.store.get("OVIRT_SYSLOG_SERVER").unwrap().as_deref(),
        Some("10.0.0.6")
    );
}

#[test]
fn storage_page_without_target_only_stores_sizes() {
    let host = Host::new();
    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();
    registry
        .apply(
            &ctx,
            "storage",
            &changes(&[("OVIRT_VOL_SWAP_SIZE", "4096"), ("OVIRT_OVERCOMMIT", "0.5")]),
            &host.lock,
        )
        .unwrap();

    assert_eq!(
        host.store.get("OVIRT_VOL_SWAP_SIZE").unwrap().as_deref(),
        Some("4096")
    );
    assert!(host.runner.commands().is_empty());
}

#[test]
fn management_page_is_read_only_and_locks_pages() {
    let host = Host::new();
    host.store
        .update_section(&Management {
            managed_by: Some("oVirt Engine".to_string()),
            managed_ifnames: vec!["ovirtmgmt".to_string()],
            managed_locked_pages: Some("network,logging".to_string()),
        })
        .unwrap();

    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();

    assert!(matches!(
        registry.apply(&ctx, "management", &changes(&[("MANAGED_BY", "me")]), &host.lock),
        Err(SetupError::ReadOnly(_))
    ));
    assert!(matches!(
        registry.apply(&ctx, "network", &changes(&[("OVIRT_HOSTNAME", "node")]), &host.lock),
        Err(SetupError::Locked { managed_by, .. }) if managed_by == "oVirt Engine"
    ));
    assert!(
        registry
            .apply(
                &ctx,
                "keyboard",
                &changes(&[("OVIRT_KEYBOARD_LAYOUT", "de")]),
                &host.lock,
            )
            .is_ok()
    );
    assert_eq!(
        PageRegistry::locked_pages(&host.store).unwrap(),
        vec!["network", "logging"]
    );
}

#[test]
fn settings_are_not_written_while_another_transaction_runs() {
    let host = Host::new();
    host.node.write("/etc/hosts", "127.0.0.1 localhost\n").unwrap();
    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();

    let running = host.lock.acquire().unwrap();
    let err = registry
        .apply(
            &ctx,
            "network",
            &changes(&[("OVIRT_HOSTNAME", "node1.example.com")]),
            &host.lock,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SetupError::Transaction(TransactionError::AlreadyRunning { .. })
    ));
    assert_eq!(host.store.get("OVIRT_HOSTNAME").unwrap(), None);
    assert!(host.runner.commands().is_empty());

    drop(running);
    registry
        .apply(
            &ctx,
            "network",
            &changes(&[("OVIRT_HOSTNAME", "node1.example.com")]),
            &host.lock,
        )
        .unwrap();
    assert_eq!(
        host.store.get("OVIRT_HOSTNAME").unwrap().as_deref(),
        Some("node1.example.com")
    );
}

#[test]
fn failed_transaction_restores_previous_settings() {
    let host = Host::new();
    host.node.write("/etc/hosts", "::1 localhost6\n").unwrap();
    host.store
        .update([("OVIRT_HOSTNAME", Some("old.example.com".to_string()))], true)
        .unwrap();
    let persist = host.persist();
    let ctx = NodeContext::new(&host.runner, &persist, &host.store, &host.paths);
    let registry = PageRegistry::build_default().unwrap();

    let err = registry
        .apply(
            &ctx,
            "network",
            &changes(&[("OVIRT_HOSTNAME", "new.example.com")]),
            &host.lock,
        )
        .unwrap_err();
    assert!(err.to_string().contains("Couldn't find entry for localhost"));
    assert_eq!(
        host.store.get("OVIRT_HOSTNAME").unwrap().as_deref(),
        Some("old.example.com")
    );
}
