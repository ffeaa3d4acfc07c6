// SPDX-License-Identifier: GPL-3.0-only

//! Typed views over a fixed set of settings keys

use std::str::FromStr;

use crate::Result;

/// A fixed, ordered group of settings keys mapped to typed fields.
///
/// `encode` produces exactly one value per entry in `KEYS`, in the same
/// order, and `decode` consumes them in that order. `Default` is the
/// absent state, i.e. what `decode` yields when no key is set.
pub trait ConfigSection: Default + Sized {
    const NAME: &'static str;
    const KEYS: &'static [&'static str];

    /// Reject the first invalid field.
    fn validate(&self) -> Result<()>;

    fn encode(&self) -> Vec<Option<String>>;

    fn decode(fields: &mut Fields) -> Self;
}

/// Sequential reader over the stored values of a section's keys
pub struct Fields {
    values: std::vec::IntoIter<Option<String>>,
}

impl Fields {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }

    pub fn text(&mut self) -> Option<String> {
        self.values.next().flatten()
    }

    /// Comma separated list; absent reads as empty.
    pub fn list(&mut self) -> Vec<String> {
        self.text()
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `yes`/`y`/`true`/`1` in any case.
    pub fn flag(&mut self) -> bool {
        self.text().is_some_and(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "yes" | "y" | "true" | "1"
            )
        })
    }

    /// Parsed value; unparsable content reads as absent.
    pub fn parsed<T: FromStr>(&mut self) -> Option<T> {
        self.text().and_then(|value| value.parse().ok())
    }
}

/// Comma joined list, absent when empty.
pub fn list_value(items: &[String]) -> Option<String> {
    let items: Vec<&str> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items.join(","))
    }
}

/// `truthy` when set, absent otherwise.
pub fn flag_value(set: bool, truthy: &str) -> Option<String> {
    set.then(|| truthy.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_values_in_key_order() {
        let mut fields = Fields::new(vec![
            Some("eth0".to_string()),
            Some("ens1, ens2,".to_string()),
            Some("Y".to_string()),
            None,
            Some("20".to_string()),
        ]);
        assert_eq!(fields.text().as_deref(), Some("eth0"));
        assert_eq!(fields.list(), vec!["ens1".to_string(), "ens2".to_string()]);
        assert!(fields.flag());
        assert!(!fields.flag());
        assert_eq!(fields.parsed::<u16>(), Some(20));
        assert_eq!(fields.text(), None);
    }

    #[test]
    fn encodes_lists_and_flags() {
        assert_eq!(list_value(&[]), None);
        assert_eq!(
            list_value(&["10.0.0.2".to_string(), " 10.0.0.3".to_string()]).as_deref(),
            Some("10.0.0.2,10.0.0.3")
        );
        assert_eq!(flag_value(true, "yes").as_deref(), Some("yes"));
        assert_eq!(flag_value(false, "yes"), None);
    }
}
