//! # Environment snapshot and value parsers.
//!
//! [`Environment`] captures variables once so resolution is deterministic and
//! tests never touch the process environment. Parsers are pure functions.

use std::collections::HashMap;

use crate::error::ConfigError;

/// Immutable snapshot of environment variables.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the current process environment (non-UTF-8 entries are skipped).
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Builds a snapshot from explicit pairs.
    ///
    /// ```rust
    /// use runner_nats::Environment;
    ///
    /// let env = Environment::from_pairs([("RUNNER_NATS_SUBJECT_ID", "test")]);
    /// assert_eq!(env.get("RUNNER_NATS_SUBJECT_ID"), Some("test"));
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns an owned string value.
    pub(crate) fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_owned)
    }

    /// Returns a boolean flag; see [`parse_flag`].
    pub(crate) fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).map(parse_flag)
    }

    /// Returns a parsed number. A present but malformed value is an error.
    pub(crate) fn number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value: raw.to_string(),
            })
    }
}

/// Parses a flag: `true` iff one of `true`/`yes`/`1`/`y`/`on` (case-insensitive).
///
/// Any other value reads as `false`.
pub fn parse_flag(val: &str) -> bool {
    matches!(
        val.trim().to_lowercase().as_str(),
        "true" | "yes" | "1" | "y" | "on"
    )
}

/// Parses a comma-separated server list, trimming and dropping empty items.
pub fn parse_servers(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parses `k=v,k2=v2` into pairs.
///
/// Each malformed item is returned as an error alongside the valid pairs,
/// so one bad item never discards the rest.
pub fn parse_headers(val: &str) -> (Vec<(String, String)>, Vec<ConfigError>) {
    let mut pairs = Vec::new();
    let mut errors = Vec::new();

    for item in val.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut parts = item.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(v), None) if !k.trim().is_empty() => {
                pairs.push((k.trim().to_string(), v.trim().to_string()));
            }
            _ => errors.push(ConfigError::InvalidHeader {
                item: item.to_string(),
            }),
        }
    }
    (pairs, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_truthy_words_only() {
        for v in ["true", "YES", "1", "y", "On", " on "] {
            assert!(parse_flag(v), "{v}");
        }
        for v in ["false", "0", "no", "off", "maybe", ""] {
            assert!(!parse_flag(v), "{v}");
        }
    }

    #[test]
    fn servers_are_trimmed() {
        assert_eq!(
            parse_servers(" nats://a:4222 , nats://b:4222,,"),
            vec!["nats://a:4222", "nats://b:4222"]
        );
    }

    #[test]
    fn headers_drop_only_malformed_items() {
        let (pairs, errors) = parse_headers("a=1, b = 2 ,broken,c=3=4,=5");
        assert_eq!(
            pairs,
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors[0],
            ConfigError::InvalidHeader {
                item: "broken".into()
            }
        );
    }

    #[test]
    fn number_reports_malformed_values() {
        let env = Environment::from_pairs([("N", "12"), ("BAD", "twelve")]);
        assert_eq!(env.number::<u32>("N"), Ok(Some(12)));
        assert_eq!(env.number::<u32>("MISSING"), Ok(None));
        let err = env.number::<u32>("BAD").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid_number");
    }
}
