// SPDX-License-Identifier: GPL-3.0-only

//! Block device models
//!
//! A `Device` is discovered fresh on every catalog query. Its `path` is the
//! canonical spelling (multipath aliases already applied), so two devices
//! compare equal exactly when their paths do.

use serde::{Deserialize, Serialize};

/// Connection bus reported by udev (`ID_BUS`)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    Usb,
    Ata,
    Scsi,
    Cciss,
    Virtio,
    #[default]
    Unknown,
}

impl BusType {
    /// Classify a device from its udev bus property and device name.
    ///
    /// virtio disks carry no `ID_BUS`, they are recognized by their `vd`
    /// node name instead.
    pub fn classify(id_bus: Option<&str>, devname: &str) -> Self {
        match id_bus {
            Some("usb") => Self::Usb,
            Some("ata") => Self::Ata,
            Some("scsi") => Self::Scsi,
            Some("cciss") => Self::Cciss,
            _ if devname.starts_with("/dev/vd") => Self::Virtio,
            _ if devname.starts_with("/dev/cciss/") => Self::Cciss,
            _ => Self::Unknown,
        }
    }

    /// Human readable label used in device listings
    pub fn label(self) -> &'static str {
        match self {
            Self::Usb => "USB Device",
            Self::Ata | Self::Scsi => "Local / FibreChannel",
            Self::Cciss => "CCISS",
            Self::Virtio => "Local (Virtio)",
            Self::Unknown => "",
        }
    }
}

/// A usable disk as listed by the device catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    /// Canonical device path (e.g., "/dev/sda" or "/dev/mapper/mpatha")
    pub path: String,

    /// Connection bus
    pub bus: BusType,

    /// Whole-disk size in MB
    pub size_mb: u64,

    /// Model string (`ID_MODEL`)
    pub model: Option<String>,

    /// Serial number (`ID_SERIAL`)
    pub serial: Option<String>,

    /// Short description: SCSI compat id, serial, or a bus hint
    pub description: String,
}

impl Device {
    /// Whether this device is a device-mapper node
    pub fn is_mapped(&self) -> bool {
        self.path.starts_with("/dev/mapper/")
    }
}
