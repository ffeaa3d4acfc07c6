// SPDX-License-Identifier: GPL-3.0-only

//! Value validators for settings and page input

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;

use crate::{ConfigError, Result};

static IQN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:iqn\.\d{4}-\d{2}(?:\.[A-Za-z](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+(?::.*)?|eui\.[0-9A-Fa-f]{16})$",
    )
    .ok()
});

static FQDN_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\-]{0,61}[A-Za-z0-9])?$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    Ipv4,
    Ipv6,
    IpAddress,
    Fqdn,
    FqdnOrIp,
    /// 0..=65535
    Port,
    Number { min: Option<i64>, max: Option<i64> },
    Boolean,
    Iqn,
    /// `host:/path`
    NfsAddress,
    /// `user@host`
    SshAddress,
    NoSpaces,
    Text,
    /// Accepts the empty value in addition to the inner validator
    Optional(Box<Validator>),
}

impl Validator {
    pub fn optional(self) -> Self {
        match self {
            Self::Optional(_) => self,
            other => Self::Optional(Box::new(other)),
        }
    }

    pub fn number(min: Option<i64>, max: Option<i64>) -> Self {
        Self::Number { min, max }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Ipv4 => "a valid IPv4 address".to_string(),
            Self::Ipv6 => "a valid IPv6 address".to_string(),
            Self::IpAddress => "a valid IPv4 or IPv6 address".to_string(),
            Self::Fqdn => "a valid FQDN".to_string(),
            Self::FqdnOrIp => "a valid FQDN or IP address".to_string(),
            Self::Port => "a port number".to_string(),
            Self::Number { min, max } => match (min, max) {
                (None, None) => "a number".to_string(),
                (min, max) => format!(
                    "a number in the bounds [{}, {}]",
                    min.map_or("-".to_string(), |v| v.to_string()),
                    max.map_or("-".to_string(), |v| v.to_string())
                ),
            },
            Self::Boolean => "a valid boolean".to_string(),
            Self::Iqn => "a valid IQN".to_string(),
            Self::NfsAddress => "a valid NFS address".to_string(),
            Self::SshAddress => "a valid SSH address".to_string(),
            Self::NoSpaces => "a string without spaces".to_string(),
            Self::Text => "anything".to_string(),
            Self::Optional(inner) => format!("{} or an empty string", inner.description()),
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Ipv4 => is_ipv4(value),
            Self::Ipv6 => is_ipv6(value),
            Self::IpAddress => is_ipv4(value) || is_ipv6(value),
            Self::Fqdn => is_fqdn(value),
            Self::FqdnOrIp => is_fqdn(value) || is_ipv4(value) || is_ipv6(value),
            Self::Port => value.parse::<u16>().is_ok(),
            Self::Number { min, max } => match parse_number(value) {
                Some(n) => min.is_none_or(|m| n >= m) && max.is_none_or(|m| n <= m),
                None => false,
            },
            Self::Boolean => parse_bool(value).is_some(),
            Self::Iqn => IQN.as_ref().is_some_and(|re| re.is_match(value)),
            Self::NfsAddress => is_nfs_address(value),
            Self::SshAddress => is_ssh_address(value),
            Self::NoSpaces => !value.is_empty() && !value.chars().any(char::is_whitespace),
            Self::Text => true,
            Self::Optional(inner) => value.is_empty() || inner.accepts(value),
        }
    }

    /// Validate `value` for `field`; absent values count as empty.
    pub fn check(&self, field: &str, value: Option<&str>) -> Result<()> {
        let value = value.unwrap_or("");
        if self.accepts(value) {
            Ok(())
        } else {
            Err(ConfigError::invalid(field, value, self.description()))
        }
    }
}

pub fn is_ipv4(value: &str) -> bool {
    value.parse::<Ipv4Addr>().is_ok()
}

pub fn is_ipv6(value: &str) -> bool {
    value.parse::<Ipv6Addr>().is_ok()
}

/// Hostname or fully qualified domain name.
///
/// Labels are 1-63 characters without a leading or trailing hyphen, the
/// whole name at most 255 characters, a trailing dot is allowed. Dotted
/// quads are rejected so malformed IPv4 addresses do not pass as names.
pub fn is_fqdn(value: &str) -> bool {
    if value.is_empty() || value.len() > 255 {
        return false;
    }
    let name = value.strip_suffix('.').unwrap_or(value);
    if looks_like_dotted_quad(name) {
        return false;
    }
    let Some(label) = FQDN_LABEL.as_ref() else {
        return false;
    };
    name.split('.').all(|part| label.is_match(part))
}

fn looks_like_dotted_quad(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() >= 4
        && parts[..4]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_nfs_address(value: &str) -> bool {
    let Some((addr, path)) = value.rsplit_once(':') else {
        return false;
    };
    (is_fqdn(addr) || is_ipv4(addr) || is_ipv6(addr)) && path.starts_with('/')
}

fn is_ssh_address(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(host), None) => {
            !user.is_empty() && (is_fqdn(host) || is_ipv4(host) || is_ipv6(host))
        }
        _ => false,
    }
}

pub fn parse_number(value: &str) -> Option<i64> {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
        return None;
    }
    value.parse().ok()
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
