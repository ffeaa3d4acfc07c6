// SPDX-License-Identifier: GPL-3.0-only

use node_sys::SysError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Sys(#[from] SysError),

    #[error("invalid value '{value}' for {field}: the field must contain {expected}")]
    Invalid {
        field: String,
        value: String,
        expected: String,
    },

    #[error("section {section} declares {expected} keys but produced {actual} values")]
    SectionArity {
        section: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl ConfigError {
    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Name of the offending field for validation errors
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
