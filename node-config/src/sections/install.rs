// SPDX-License-Identifier: GPL-3.0-only

use serde::Serialize;

use crate::section::{ConfigSection, Fields, flag_value, list_value};
use crate::valid::Validator;
use crate::{ConfigError, Result};

/// Installation targets and volume sizes picked up by the storage backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Installation {
    /// Target devices; the first one receives the root partitions
    pub init: Vec<String>,
    pub overcommit: Option<String>,
    pub root_size: Option<String>,
    pub efi_size: Option<String>,
    pub swap_size: Option<String>,
    pub logging_size: Option<String>,
    pub config_size: Option<String>,
    pub data_size: Option<String>,
    pub install: bool,
    pub upgrade: bool,
    pub install_root: bool,
    pub root_install: bool,
    pub iscsi_install: bool,
}

/// Volume sizes for [`Installation::install_on`], in MB
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeRequest {
    pub root: Option<String>,
    pub efi: Option<String>,
    pub swap: Option<String>,
    pub logging: Option<String>,
    pub config: Option<String>,
    pub data: Option<String>,
}

impl Installation {
    /// Settings for a fresh install of root and HostVG on `init`.
    pub fn install_on(init: Vec<String>, volumes: VolumeRequest) -> Self {
        Self {
            init,
            root_size: volumes.root,
            efi_size: volumes.efi,
            swap_size: volumes.swap,
            logging_size: volumes.logging,
            config_size: volumes.config,
            data_size: volumes.data,
            install: true,
            install_root: true,
            root_install: true,
            ..Self::default()
        }
    }

    /// Switch an existing model to upgrade mode.
    pub fn upgrade(mut self) -> Self {
        self.upgrade = true;
        self.install = false;
        self
    }
}

impl ConfigSection for Installation {
    const NAME: &'static str = "Installation";
    const KEYS: &'static [&'static str] = &[
        "OVIRT_INIT",
        "OVIRT_OVERCOMMIT",
        "OVIRT_VOL_ROOT_SIZE",
        "OVIRT_VOL_EFI_SIZE",
        "OVIRT_VOL_SWAP_SIZE",
        "OVIRT_VOL_LOGGING_SIZE",
        "OVIRT_VOL_CONFIG_SIZE",
        "OVIRT_VOL_DATA_SIZE",
        "OVIRT_INSTALL",
        "OVIRT_UPGRADE",
        "OVIRT_INSTALL_ROOT",
        "OVIRT_ROOT_INSTALL",
        "OVIRT_ISCSI_INSTALL",
    ];

    fn validate(&self) -> Result<()> {
        if let Some(overcommit) = &self.overcommit {
            if !overcommit.parse::<f64>().is_ok_and(|v| v >= 0.0) {
                return Err(ConfigError::invalid(
                    "overcommit",
                    overcommit,
                    "a non-negative decimal number",
                ));
            }
        }
        let size = Validator::number(Some(0), None).optional();
        size.check("root_size", self.root_size.as_deref())?;
        size.check("efi_size", self.efi_size.as_deref())?;
        size.check("swap_size", self.swap_size.as_deref())?;
        size.check("logging_size", self.logging_size.as_deref())?;
        size.check("config_size", self.config_size.as_deref())?;
        Validator::number(Some(-1), None)
            .optional()
            .check("data_size", self.data_size.as_deref())?;
        for device in &self.init {
            Validator::NoSpaces.check("init", Some(device))?;
        }
        Ok(())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            list_value(&self.init),
            self.overcommit.clone(),
            self.root_size.clone(),
            self.efi_size.clone(),
            self.swap_size.clone(),
            self.logging_size.clone(),
            self.config_size.clone(),
            self.data_size.clone(),
            flag_value(self.install, "1"),
            flag_value(self.upgrade, "1"),
            flag_value(self.install_root, "y"),
            flag_value(self.root_install, "y"),
            flag_value(self.iscsi_install, "Y"),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            init: fields.list(),
            overcommit: fields.text(),
            root_size: fields.text(),
            efi_size: fields.text(),
            swap_size: fields.text(),
            logging_size: fields.text(),
            config_size: fields.text(),
            data_size: fields.text(),
            install: fields.flag(),
            upgrade: fields.flag(),
            install_root: fields.flag(),
            root_install: fields.flag(),
            iscsi_install: fields.flag(),
        }
    }
}

/// Information published by a management system that has taken over
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Management {
    pub managed_by: Option<String>,
    pub managed_ifnames: Vec<String>,
    pub managed_locked_pages: Option<String>,
}

impl Management {
    pub fn is_managed(&self) -> bool {
        self.managed_by.is_some()
    }

    pub fn has_managed_ifnames(&self) -> bool {
        !self.managed_ifnames.is_empty()
    }
}

impl ConfigSection for Management {
    const NAME: &'static str = "Management";
    const KEYS: &'static [&'static str] =
        &["MANAGED_BY", "MANAGED_IFNAMES", "MANAGED_LOCKED_PAGES"];

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn encode(&self) -> Vec<Option<String>> {
        vec![
            self.managed_by.clone(),
            list_value(&self.managed_ifnames),
            self.managed_locked_pages.clone(),
        ]
    }

    fn decode(fields: &mut Fields) -> Self {
        Self {
            managed_by: fields.text(),
            managed_ifnames: fields.list(),
            managed_locked_pages: fields.text(),
        }
    }
}
