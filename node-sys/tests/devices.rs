// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::Path;
use std::time::Duration;

use node_sys::devices::wait_for_partition;
use node_sys::{CatalogPaths, DeviceCatalog};
use node_testing::ScriptedRunner;
use node_types::BusType;

const MPATHA: &str = "mpatha (360014051f3a9d3e2c2b4cfa2dbd2a1f7) dm-0 LIO-ORG,disk0\n\
size=20G features='0' hwhandler='1 alua' wp=rw\n";

fn sysfs(root: &Path, disks: &[(&str, &str)]) -> CatalogPaths {
    let sys_block = root.join("sys/block");
    for (name, dev) in disks {
        fs::create_dir_all(sys_block.join(name)).unwrap();
        fs::write(sys_block.join(name).join("dev"), format!("{dev}\n")).unwrap();
    }
    fs::create_dir_all(root.join("dev/disk/by-id")).unwrap();
    CatalogPaths {
        sys_block,
        dev_by_id: root.join("dev/disk/by-id"),
        dev_cciss: root.join("dev/cciss"),
    }
}

fn scripted_host() -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    runner
        .respond(
            "udevadm info --query=property --name=/dev/sda",
            "ID_BUS=ata\nID_MODEL=QEMU_HARDDISK\nID_SERIAL=QM00001\n",
        )
        .respond("udevadm info --query=property --name=/dev/sdd", "ID_CDROM=1\n")
        .respond("dmsetup ls --target=multipath", "mpatha\t(253:0)\n")
        .respond("dmsetup deps mpatha", "2 dependencies  : (8, 32) (8, 16)\n")
        .respond("multipath -ll mpatha", MPATHA)
        .respond("multipath -ll /dev/sdb", MPATHA)
        .respond("multipath -ll /dev/sdc", MPATHA)
        .respond("sfdisk -s /dev/sda", "10485760\n")
        .respond("sfdisk -s /dev/sdd", "1024\n")
        .respond("sfdisk -s /dev/sde", "garbage\n")
        .respond("sfdisk -s /dev/mapper/mpatha", "20971520\n");
    runner
}

#[test]
fn lists_one_entry_per_disk() {
    let dir = tempfile::tempdir().unwrap();
    let paths = sysfs(
        dir.path(),
        &[
            ("sda", "8:0"),
            ("sdb", "8:16"),
            ("sdc", "8:32"),
            ("sdd", "8:48"),
            ("sde", "8:64"),
            ("sr0", "11:0"),
            ("loop0", "7:0"),
            ("dm-0", "253:0"),
        ],
    );
    let runner = scripted_host();
    let catalog = DeviceCatalog::with_paths(&runner, paths);

    let devices = catalog.list_devices();
    let listed: Vec<&str> = devices.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(listed, vec!["/dev/mapper/mpatha", "/dev/sda"]);

    assert_eq!(devices[0].size_mb, 20480);
    assert!(devices[0].is_mapped());
    assert_eq!(devices[1].size_mb, 10240);
    assert_eq!(devices[1].bus, BusType::Ata);
    assert_eq!(devices[1].serial.as_deref(), Some("QM00001"));
}

#[test]
fn canonicalization_is_idempotent() {
    let runner = scripted_host();
    let catalog = DeviceCatalog::new(&runner);

    let from_member = catalog.canonicalize("/dev/sdb");
    assert_eq!(from_member, "/dev/mapper/mpatha");
    assert_eq!(catalog.canonicalize(&from_member), from_member);
    assert_eq!(catalog.canonicalize("/dev/sdc"), from_member);
    assert_eq!(catalog.canonicalize("/dev/sda"), "/dev/sda");
}

#[test]
fn cciss_devices_resolve_through_cciss_id() {
    let runner = ScriptedRunner::new();
    runner.respond("cciss_id /dev/cciss/c0d0", "3600508b1001c4d5e\n");
    let catalog = DeviceCatalog::new(&runner);

    assert_eq!(
        catalog.canonicalize("/dev/cciss/c0d0"),
        "/dev/mapper/3600508b1001c4d5e"
    );
}

#[test]
fn size_query_failure_is_an_error() {
    let runner = ScriptedRunner::new();
    runner.fail("sfdisk -s /dev/sdz", "No such device");
    let catalog = DeviceCatalog::new(&runner);

    assert!(catalog.size_mb("/dev/sdz").is_err());
}

#[test]
fn partition_wait_is_bounded() {
    let runner = ScriptedRunner::new();
    assert_eq!(
        wait_for_partition(&runner, "/dev/sdb", 1, 15, Duration::from_secs(1)),
        None
    );
    assert_eq!(runner.pauses().len(), 15);

    runner.with_path("/dev/mapper/mpathap4");
    assert_eq!(
        wait_for_partition(&runner, "/dev/mapper/mpatha", 4, 15, Duration::from_secs(1)),
        Some("/dev/mapper/mpathap4".to_string())
    );
}
