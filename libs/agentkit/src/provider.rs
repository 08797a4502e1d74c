//! Provider information: small key/value bundles services publish for each other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInformation {
    pub name: String,
    /// Unique name of the publishing service (`application/service`).
    pub origin: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ProviderInformation {
    #[must_use]
    pub fn new(name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            data: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// `PROVIDER__<ORIGIN>__<NAME>__<KEY>`, upper-cased, non-alphanumerics as `_`.
    #[must_use]
    pub fn env_key(&self, key: &str) -> String {
        format!(
            "PROVIDER__{}__{}__{}",
            env_segment(&self.origin),
            env_segment(&self.name),
            env_segment(key)
        )
    }

    /// Every entry as an environment variable pair.
    #[must_use]
    pub fn as_env(&self) -> Vec<(String, String)> {
        self.data
            .iter()
            .map(|(k, v)| (self.env_key(k), v.clone()))
            .collect()
    }
}

fn env_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Look up `key` in the provider `name` published by `origin`.
#[must_use]
pub fn find_provider_value<'a>(
    infos: &'a [ProviderInformation],
    origin: &str,
    name: &str,
    key: &str,
) -> Option<&'a str> {
    infos
        .iter()
        .find(|p| p.origin == origin && p.name == name)
        .and_then(|p| p.data.get(key))
        .map(String::as_str)
}
