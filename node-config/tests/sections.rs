// SPDX-License-Identifier: GPL-3.0-only

use std::fmt::Debug;

use node_config::sections::*;
use node_config::{ConfigError, ConfigSection, ConfigStore};
use node_testing::NodeRoot;
use node_types::{Bootproto, Ipv6Bootproto};

fn store(root: &NodeRoot) -> ConfigStore {
    ConfigStore::new(root.path("/etc/default/ovirt"))
}

fn assert_round_trip<S>(store: &ConfigStore, section: S)
where
    S: ConfigSection + Clone + PartialEq + Debug,
{
    assert_eq!(
        section.encode().len(),
        S::KEYS.len(),
        "{} encodes one value per key",
        S::NAME
    );
    store.update_section(&section).unwrap();
    assert_eq!(store.retrieve_section::<S>().unwrap(), section);

    store.clear_section::<S>(None).unwrap();
    assert_eq!(store.retrieve_section::<S>().unwrap(), S::default());
}

#[test]
fn every_section_round_trips() {
    let root = NodeRoot::new().unwrap();
    let store = store(&root);

    assert_round_trip(
        &store,
        Network::static_ip(
            "eth0",
            "10.0.0.1",
            "255.0.0.0",
            Some("10.0.0.255".into()),
            Some("20".into()),
        ),
    );
    assert_round_trip(&store, Network::dhcp("eth0", None));
    assert_round_trip(
        &store,
        NicBonding::new(
            "bond0",
            vec!["ens1".into(), "ens2".into(), "ens3".into()],
            Some("mode=4".into()),
        ),
    );
    assert_round_trip(&store, NetworkTopology::bridged());
    assert_round_trip(
        &store,
        Ipv6::static_ip("11::22", "42", Some("11::44".into())),
    );
    assert_round_trip(
        &store,
        Hostname {
            hostname: Some("host.example.com".into()),
        },
    );
    assert_round_trip(
        &store,
        Nameservers {
            servers: vec!["10.0.0.2".into(), "10.0.0.3".into()],
        },
    );
    assert_round_trip(
        &store,
        Timeservers {
            servers: vec!["10.0.0.4".into(), "10.0.0.5".into(), "0.example.com".into()],
        },
    );
    assert_round_trip(&store, Syslog::new("10.0.0.6", "514"));
    assert_round_trip(&store, Collectd::new("10.0.0.7", "42"));
    assert_round_trip(&store, Netconsole::new("10.0.0.9", "666"));
    assert_round_trip(
        &store,
        KDump {
            nfs: Some("host.example.com:/dst/path".into()),
            ssh: Some("root@host.example.com".into()),
            local: true,
        },
    );
    assert_round_trip(
        &store,
        Iscsi {
            name: Some("iqn.1992-01.com.example:node".into()),
            target_name: Some("iqn.1992-01.com.example:target".into()),
            target_host: Some("10.0.0.8".into()),
            target_port: Some("42".into()),
        },
    );
    assert_round_trip(
        &store,
        Logrotate {
            max_size: Some("42".into()),
        },
    );
    assert_round_trip(
        &store,
        Keyboard {
            layout: Some("de".into()),
        },
    );
    assert_round_trip(
        &store,
        Nfsv4 {
            domain: Some("foo.example".into()),
        },
    );
    assert_round_trip(
        &store,
        Ssh {
            pwauth: true,
            num_bytes: Some("24".into()),
            disable_aesni: true,
        },
    );
    assert_round_trip(
        &store,
        Installation::install_on(
            vec!["/dev/sda".into(), "/dev/sdb".into()],
            VolumeRequest {
                root: Some("512".into()),
                data: Some("-1".into()),
                ..VolumeRequest::default()
            },
        ),
    );
    assert_round_trip(
        &store,
        Management {
            managed_by: Some("oVirt Engine at https://engine".into()),
            managed_ifnames: vec!["ovirtmgmt".into()],
            managed_locked_pages: None,
        },
    );

    assert!(store.load().unwrap().is_empty());
}

#[test]
fn stored_representation_matches_shell_conventions() {
    let root = NodeRoot::new().unwrap();
    let store = store(&root);

    store
        .update_section(&Ssh {
            pwauth: true,
            num_bytes: None,
            disable_aesni: false,
        })
        .unwrap();
    store
        .update_section(&NicBonding::mode_8023ad(
            "bond0",
            vec!["ens1".into(), "ens2".into()],
        ))
        .unwrap();

    let content = root.read("/etc/default/ovirt");
    assert_eq!(
        content,
        "OVIRT_BOND_NAME=\"bond0\"\n\
         OVIRT_BOND_OPTIONS=\"mode=4\"\n\
         OVIRT_BOND_SLAVES=\"ens1,ens2\"\n\
         OVIRT_SSH_PWAUTH=\"yes\"\n"
    );
}

#[test]
fn bond_options_default_only_for_named_bonds() {
    let root = NodeRoot::new().unwrap();
    let store = store(&root);

    store
        .update_section(&NicBonding::new("bond1", vec!["eth1".into()], None))
        .unwrap();
    assert_eq!(
        store.get("OVIRT_BOND_OPTIONS").unwrap().as_deref(),
        Some(NicBonding::DEFAULT_OPTIONS)
    );

    store.update_section(&NicBonding::no_bond()).unwrap();
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn invalid_values_are_rejected_before_writing() {
    let root = NodeRoot::new().unwrap();
    let store = store(&root);

    let err = store
        .update_section(&Network::static_ip("eth0", "10.0.0.300", "255.0.0.0", None, None))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "ipaddr"));
    assert!(!store.exists());

    let err = store
        .update_section(&NicBonding::new("eth0", vec![], None))
        .unwrap_err();
    assert_eq!(err.field(), Some("name"));

    let err = store.update_section(&Iscsi::default()).unwrap_err();
    assert_eq!(err.field(), Some("name"));

    let err = store
        .update_section(&Syslog::new("syslog.example.com", "70000"))
        .unwrap_err();
    assert_eq!(err.field(), Some("port"));
}

#[test]
fn modify_keeps_untouched_fields() {
    let root = NodeRoot::new().unwrap();
    let store = store(&root);

    store
        .update_section(&Network::dhcp("eth0", Some("20".into())))
        .unwrap();
    let updated = store
        .modify_section(|network: &mut Network| network.vlanid = None)
        .unwrap();

    assert_eq!(updated.iface.as_deref(), Some("eth0"));
    assert_eq!(updated.bootproto, Some(Bootproto::Dhcp));
    assert_eq!(store.get("OVIRT_VLAN").unwrap(), None);
}

#[test]
fn clear_accepts_a_key_subset() {
    let root = NodeRoot::new().unwrap();
    let store = store(&root);

    store.update_section(&Ipv6::auto()).unwrap();
    store
        .update_section(&Ipv6 {
            bootproto: Some(Ipv6Bootproto::Static),
            ipaddr: Some("11::22".into()),
            netmask: Some("64".into()),
            gateway: None,
        })
        .unwrap();
    store
        .clear_section::<Ipv6>(Some(&["OVIRT_IPV6_ADDRESS", "OVIRT_IPV6_NETMASK"]))
        .unwrap();

    let ipv6 = store.retrieve_section::<Ipv6>().unwrap();
    assert_eq!(ipv6.bootproto, Some(Ipv6Bootproto::Static));
    assert_eq!(ipv6.ipaddr, None);
}

#[test]
fn retrieval_tolerates_foreign_content() {
    let root = NodeRoot::new().unwrap();
    root.write(
        "/etc/default/ovirt",
        "# written by hand\nOVIRT_HOSTNAME=node1\ngarbage line\nOVIRT_DNS=\"\"\n",
    )
    .unwrap();
    let store = store(&root);

    assert_eq!(
        store.retrieve_section::<Hostname>().unwrap().hostname.as_deref(),
        Some("node1")
    );
    assert!(store.retrieve_section::<Nameservers>().unwrap().servers.is_empty());
}
