// SPDX-License-Identifier: GPL-3.0-only

use node_config::ConfigStore;
use node_config::sections::{Network, NetworkTopology, NicBonding};
use node_network::{NETWORK_SERVICES, NetworkError, NetworkProvisioner};
use node_sys::{PersistPaths, PersistentStore};
use node_testing::{NodeRoot, ScriptedRunner};
use node_transaction::TransactionLock;

struct Host {
    node: NodeRoot,
    runner: ScriptedRunner,
    store: ConfigStore,
    lock: TransactionLock,
}

impl Host {
    fn new(nics: &[(&str, &str)]) -> Self {
        let node = NodeRoot::new().unwrap();
        for (name, mac) in nics {
            node.mkdir(&format!("/sys/class/net/{name}/device")).unwrap();
            node.write(&format!("/sys/class/net/{name}/address"), &format!("{mac}\n"))
                .unwrap();
        }
        let store = ConfigStore::new(node.path("/etc/default/ovirt"));
        let lock = TransactionLock::new(node.path("/transaction-in-progress"));
        Self {
            node,
            runner: ScriptedRunner::new(),
            store,
            lock,
        }
    }

    fn persist(&self) -> PersistentStore<'_> {
        PersistentStore::with_paths(
            &self.runner,
            PersistPaths {
                root: self.node.root().to_path_buf(),
                base: self.node.path("/config"),
                manifest: self.node.path("/config/files"),
                mountinfo: self.node.path("/proc/self/mountinfo"),
            },
        )
    }

    fn ifcfg(&self, device: &str) -> String {
        self.node
            .read(&format!("/etc/sysconfig/network-scripts/ifcfg-{device}"))
    }
}

#[test]
fn bridged_dhcp_replaces_old_configuration() {
    let host = Host::new(&[("eth0", "52:54:00:00:00:01"), ("eth1", "52:54:00:00:00:02")]);
    host.node
        .write("/etc/sysconfig/network-scripts/ifcfg-eth5", "DEVICE=eth5\nONBOOT=yes\n")
        .unwrap();
    host.node
        .write("/etc/sysconfig/network", "HOSTNAME=node\nNETWORKING=no\n")
        .unwrap();
    host.node
        .write("/etc/udev/rules.d/70-persistent-net.rules", "# rules\n")
        .unwrap();
    host.store.update_section(&Network::dhcp("eth0", None)).unwrap();
    host.store.update_section(&NetworkTopology::bridged()).unwrap();

    let persist = host.persist();
    let provisioner =
        NetworkProvisioner::new(&host.runner, &persist, &host.store).with_root(host.node.root());
    let tx = provisioner.transaction();
    assert_eq!(tx.title(), "Applying new network configuration");
    assert_eq!(tx.len(), 5);
    tx.run(&host.lock).unwrap();

    let bridge = host.ifcfg("breth0");
    assert!(bridge.contains("TYPE=Bridge"));
    assert!(bridge.contains("BOOTPROTO=dhcp"));
    assert!(bridge.contains("DELAY=0"));

    let nic = host.ifcfg("eth0");
    assert!(nic.contains("BRIDGE=breth0"));
    assert!(nic.contains("HWADDR=52:54:00:00:00:01"));
    assert!(!nic.contains("BOOTPROTO"));

    assert!(host.ifcfg("eth1").contains("ONBOOT=no"));
    assert!(host.ifcfg("lo").contains("IPADDR=127.0.0.1"));
    assert!(!host.node.exists("/etc/sysconfig/network-scripts/ifcfg-eth5"));

    let sysconfig = host.node.read("/etc/sysconfig/network");
    assert!(sysconfig.contains("HOSTNAME=node"));
    assert!(sysconfig.contains("NETWORKING=yes"));
    assert!(!sysconfig.contains("NETWORKING=no"));
    assert!(host.node.exists("/etc/udev/rules.d/71-persistent-node-net.rules"));

    assert!(host.runner.ran("killall dhclient"));
    let stop_network = host.runner.position("service network stop").unwrap();
    let start_network = host.runner.position("service network start").unwrap();
    assert!(stop_network < start_network);
    for service in NETWORK_SERVICES {
        assert_eq!(host.runner.count(&format!("service {service} ")), 2);
    }
}

#[test]
fn direct_static_with_vlan() {
    let host = Host::new(&[("eth0", "52:54:00:00:00:01")]);
    host.store
        .update_section(&Network::static_ip(
            "eth0",
            "192.168.122.10",
            "255.255.255.0",
            Some("192.168.122.1".to_string()),
            Some("42".to_string()),
        ))
        .unwrap();
    host.store.update_section(&NetworkTopology::direct()).unwrap();

    let persist = host.persist();
    let provisioner =
        NetworkProvisioner::new(&host.runner, &persist, &host.store).with_root(host.node.root());
    provisioner.transaction().run(&host.lock).unwrap();

    let vlan = host.ifcfg("eth0.42");
    assert!(vlan.contains("VLAN=yes"));
    assert!(vlan.contains("IPADDR=192.168.122.10"));
    assert!(vlan.contains("GATEWAY=192.168.122.1"));
    assert!(!host.ifcfg("eth0").contains("IPADDR"));
    assert!(!host.node.exists("/etc/sysconfig/network-scripts/ifcfg-breth0"));
}

#[test]
fn no_networking_turns_networking_off() {
    let host = Host::new(&[("eth0", "52:54:00:00:00:01")]);
    host.store.update_section(&Network::no_networking()).unwrap();

    let persist = host.persist();
    let provisioner =
        NetworkProvisioner::new(&host.runner, &persist, &host.store).with_root(host.node.root());
    provisioner.transaction().run(&host.lock).unwrap();

    assert!(host.node.read("/etc/sysconfig/network").contains("NETWORKING=no"));
    assert!(host.ifcfg("eth0").contains("ONBOOT=no"));
}

#[test]
fn invalid_bond_stops_before_anything_is_removed() {
    let host = Host::new(&[("ens1", "52:54:00:00:00:01")]);
    host.node
        .write("/etc/sysconfig/network-scripts/ifcfg-ens1", "DEVICE=ens1\n")
        .unwrap();
    host.store
        .update_section(&NicBonding::mode_8023ad("bond0", vec!["ens1".into()]))
        .unwrap();
    host.store.update_section(&Network::dhcp("ens1", None)).unwrap();

    let persist = host.persist();
    let provisioner =
        NetworkProvisioner::new(&host.runner, &persist, &host.store).with_root(host.node.root());
    assert!(matches!(
        provisioner.plan(),
        Err(NetworkError::SlaveIsPrimary { .. })
    ));
    assert!(provisioner.transaction().run(&host.lock).is_err());

    assert!(host.runner.commands().is_empty());
    assert!(host.node.exists("/etc/sysconfig/network-scripts/ifcfg-ens1"));
}

#[test]
fn bond_is_written_and_removed_again() {
    let host = Host::new(&[
        ("ens1", "52:54:00:00:00:01"),
        ("ens2", "52:54:00:00:00:02"),
        ("ens3", "52:54:00:00:00:03"),
    ]);
    let slaves = vec!["ens1".to_string(), "ens2".to_string(), "ens3".to_string()];
    host.store
        .update_section(&NicBonding::mode_8023ad("bond0", slaves))
        .unwrap();
    host.store.update_section(&Network::dhcp("bond0", None)).unwrap();

    let persist = host.persist();
    let provisioner =
        NetworkProvisioner::new(&host.runner, &persist, &host.store).with_root(host.node.root());
    provisioner
        .bond_transaction()
        .unwrap()
        .run(&host.lock)
        .unwrap();

    let master = host.ifcfg("bond0");
    assert!(master.contains("TYPE=Bond"));
    assert!(master.contains("BONDING_OPTS=mode=4"));
    for slave in ["ens1", "ens2", "ens3"] {
        let record = host.ifcfg(slave);
        assert!(record.contains("MASTER=bond0"), "{slave}: {record}");
        assert!(record.contains("SLAVE=yes"));
    }

    host.store.update_section(&NicBonding::no_bond()).unwrap();
    let tx = provisioner.bond_transaction().unwrap();
    assert_eq!(tx.step_titles(), vec!["Clean potential bond configurations"]);
    tx.run(&host.lock).unwrap();

    assert!(!host.node.exists("/etc/sysconfig/network-scripts/ifcfg-bond0"));
    for slave in ["ens1", "ens2", "ens3"] {
        let record = host.ifcfg(slave);
        assert!(record.contains("ONBOOT=yes"));
        assert!(!record.contains("MASTER"));
        assert!(!record.contains("SLAVE"));
    }
    let network: Network = host.store.retrieve_section().unwrap();
    assert_eq!(network, Network::no_networking());
}
