//! Persisted per-service settings.

use serde::{Deserialize, Serialize};

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Developer only.
    pub debug: bool,
    /// Developer only: re-init on source changes.
    pub watch: bool,
    /// Discard server output instead of forwarding it.
    pub silent: bool,
    /// Run one read replica next to the primary.
    pub read_replica: bool,
    /// Keep data across runs; `Stop` leaves the servers running.
    pub persist: bool,
}

impl Settings {
    #[must_use]
    pub fn replica_count(&self) -> u32 {
        u32::from(self.read_replica)
    }
}

/// Partial update applied by `Update`. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SettingsPatch {
    pub debug: Option<bool>,
    pub watch: Option<bool>,
    pub silent: Option<bool>,
    pub read_replica: Option<bool>,
    pub persist: Option<bool>,
}

impl SettingsPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn apply(&self, settings: &Settings) -> Settings {
        Settings {
            debug: self.debug.unwrap_or(settings.debug),
            watch: self.watch.unwrap_or(settings.watch),
            silent: self.silent.unwrap_or(settings.silent),
            read_replica: self.read_replica.unwrap_or(settings.read_replica),
            persist: self.persist.unwrap_or(settings.persist),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn replica_count_follows_flag() {
        let mut settings = Settings::default();
        assert_eq!(settings.replica_count(), 0);
        settings.read_replica = true;
        assert_eq!(settings.replica_count(), 1);
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let settings = Settings {
            read_replica: true,
            silent: true,
            ..Settings::default()
        };
        let patch = SettingsPatch {
            persist: Some(true),
            silent: Some(false),
            ..SettingsPatch::default()
        };

        let patched = patch.apply(&settings);
        assert!(patched.read_replica);
        assert!(patched.persist);
        assert!(!patched.silent);
        assert!(SettingsPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn json_blob_uses_kebab_case() {
        let settings: Settings =
            serde_json::from_value(serde_json::json!({"read-replica": true, "persist": true}))
                .unwrap();
        assert!(settings.read_replica);
        assert!(settings.persist);
        assert!(!settings.debug);
    }
}
