//! Settings store implementations.

use std::collections::HashMap;
use std::path::PathBuf;

use agentkit::ServiceIdentity;
use anyhow::{Context, bail};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::repo::SettingsStore;
use crate::domain::settings::Settings;

pub const SETTINGS_FILE: &str = "service.settings.yaml";

/// One YAML file per service, next to its definition.
#[derive(Debug, Clone, Default)]
pub struct YamlSettingsStore;

impl YamlSettingsStore {
    fn path(identity: &ServiceIdentity) -> anyhow::Result<PathBuf> {
        if identity.location.as_os_str().is_empty() {
            bail!("service {} has no location", identity.unique());
        }
        Ok(identity.location.join(SETTINGS_FILE))
    }
}

#[async_trait]
impl SettingsStore for YamlSettingsStore {
    async fn load(&self, identity: &ServiceIdentity) -> anyhow::Result<Option<Settings>> {
        let path = Self::path(identity)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };
        let settings = serde_saphyr::from_str(&content)
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(Some(settings))
    }

    async fn save(&self, identity: &ServiceIdentity, settings: &Settings) -> anyhow::Result<()> {
        let path = Self::path(identity)?;
        tokio::fs::create_dir_all(&identity.location)
            .await
            .with_context(|| format!("cannot create {}", identity.location.display()))?;

        let content = serde_saphyr::to_string(settings).context("cannot serialize settings")?;
        let tmp = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("cannot replace {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Settings saved");
        Ok(())
    }
}

/// Keeps settings in memory, keyed by `application/name`.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    records: Mutex<HashMap<String, Settings>>,
}

impl InMemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, identity: &ServiceIdentity) -> Option<Settings> {
        self.records.lock().get(&identity.unique()).cloned()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn load(&self, identity: &ServiceIdentity) -> anyhow::Result<Option<Settings>> {
        Ok(self.get(identity))
    }

    async fn save(&self, identity: &ServiceIdentity, settings: &Settings) -> anyhow::Result<()> {
        self.records
            .lock()
            .insert(identity.unique(), settings.clone());
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn identity(dir: &std::path::Path) -> ServiceIdentity {
        ServiceIdentity::new("shop", "cache").with_location(dir.join("services/cache"))
    }

    #[tokio::test]
    async fn yaml_store_round_trips_settings() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        let store = YamlSettingsStore;

        assert_eq!(store.load(&id).await.unwrap(), None);

        let settings = Settings {
            read_replica: true,
            persist: true,
            ..Settings::default()
        };
        store.save(&id, &settings).await.unwrap();

        assert_eq!(store.load(&id).await.unwrap(), Some(settings));
        let raw = std::fs::read_to_string(id.location.join(SETTINGS_FILE)).unwrap();
        assert!(raw.contains("read-replica: true"));
    }

    #[tokio::test]
    async fn yaml_store_reads_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        std::fs::create_dir_all(&id.location).unwrap();
        std::fs::write(id.location.join(SETTINGS_FILE), "silent: true\n").unwrap();

        let settings = YamlSettingsStore.load(&id).await.unwrap().unwrap();
        assert!(settings.silent);
        assert!(!settings.read_replica);
    }

    #[tokio::test]
    async fn yaml_store_reports_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let id = identity(dir.path());
        std::fs::create_dir_all(&id.location).unwrap();
        std::fs::write(id.location.join(SETTINGS_FILE), "silent: [not, a, bool]\n").unwrap();

        let err = YamlSettingsStore.load(&id).await.unwrap_err();
        assert!(err.to_string().contains("invalid settings"));
    }

    #[tokio::test]
    async fn yaml_store_needs_a_location() {
        let id = ServiceIdentity::new("shop", "cache");
        assert!(YamlSettingsStore.load(&id).await.is_err());
    }

    #[tokio::test]
    async fn memory_store_is_keyed_by_service() {
        let store = InMemorySettingsStore::new();
        let cache = ServiceIdentity::new("shop", "cache");
        let other = ServiceIdentity::new("shop", "sessions");

        store
            .save(
                &cache,
                &Settings {
                    debug: true,
                    ..Settings::default()
                },
            )
            .await
            .unwrap();

        assert!(store.load(&cache).await.unwrap().unwrap().debug);
        assert_eq!(store.load(&other).await.unwrap(), None);
    }
}
