//! Connection configuration handed back to the platform after `Init`.
//!
//! Records are partitioned by [`NetworkScope`]: a native process and a
//! container asking for the same endpoint must receive different hostnames.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::NetworkScope;

/// A single `key = value` entry. Secret values are redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationValue {
    pub key: String,
    value: String,
    pub secret: bool,
}

impl ConfigurationValue {
    #[must_use]
    pub fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret: false,
        }
    }

    #[must_use]
    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret: true,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for ConfigurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: &str = if self.secret { "[REDACTED]" } else { &self.value };
        f.debug_struct("ConfigurationValue")
            .field("key", &self.key)
            .field("value", &value)
            .field("secret", &self.secret)
            .finish()
    }
}

/// Named group of values, keyed by endpoint name (`write`, `read`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub name: String,
    pub values: Vec<ConfigurationValue>,
}

impl ConfigurationRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<ConfigurationValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigurationValue> {
        self.values.iter().find(|v| v.key == key)
    }
}

/// A record tagged with the scope of the instance it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedRecord {
    pub scope: NetworkScope,
    pub record: ConfigurationRecord,
}

/// Everything exported by one `Init`, partitioned by scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedConfiguration {
    scopes: BTreeMap<NetworkScope, Vec<ConfigurationRecord>>,
}

impl ExportedConfiguration {
    #[must_use]
    pub fn for_scope(&self, scope: NetworkScope) -> &[ConfigurationRecord] {
        self.scopes.get(&scope).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn scopes(&self) -> Vec<NetworkScope> {
        self.scopes.keys().copied().collect()
    }

    /// Look up `key` in the record `name` of `scope`.
    #[must_use]
    pub fn find_value(&self, scope: NetworkScope, name: &str, key: &str) -> Option<&str> {
        self.for_scope(scope)
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.get(key))
            .map(ConfigurationValue::value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Group records by the scope of the instance they came from.
///
/// Emission order is preserved inside each scope.
#[must_use]
pub fn partition_by_scope(records: Vec<ScopedRecord>) -> ExportedConfiguration {
    let mut scopes: BTreeMap<NetworkScope, Vec<ConfigurationRecord>> = BTreeMap::new();
    for ScopedRecord { scope, record } in records {
        scopes.entry(scope).or_default().push(record);
    }
    ExportedConfiguration { scopes }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn scoped(scope: NetworkScope, name: &str, url: &str) -> ScopedRecord {
        ScopedRecord {
            scope,
            record: ConfigurationRecord::new(
                name,
                vec![ConfigurationValue::secret("connection", url)],
            ),
        }
    }

    #[test]
    fn partition_keeps_both_scopes() {
        let exported = partition_by_scope(vec![
            scoped(NetworkScope::Native, "write", "redis://localhost:7000"),
            scoped(NetworkScope::Container, "write", "redis://host.docker.internal:7000"),
            scoped(NetworkScope::Native, "read", "redis://localhost:7001"),
        ]);

        assert_eq!(
            exported.scopes(),
            vec![NetworkScope::Native, NetworkScope::Container]
        );
        assert_eq!(exported.for_scope(NetworkScope::Native).len(), 2);
        assert_eq!(
            exported.find_value(NetworkScope::Container, "write", "connection"),
            Some("redis://host.docker.internal:7000")
        );
        assert_eq!(
            exported.find_value(NetworkScope::Container, "read", "connection"),
            None
        );
    }

    #[test]
    fn secret_values_are_redacted_in_debug() {
        let value = ConfigurationValue::secret("connection", "redis://:pw@localhost:7000");
        let dbg = format!("{value:?}");
        assert!(!dbg.contains("pw@"));
        assert!(dbg.contains("[REDACTED]"));

        let plain = ConfigurationValue::plain("mode", "replica");
        assert!(format!("{plain:?}").contains("replica"));
    }

    #[test]
    fn empty_partition_has_no_scopes() {
        let exported = partition_by_scope(vec![]);
        assert!(exported.is_empty());
        assert!(exported.for_scope(NetworkScope::Native).is_empty());
    }
}
