use agentkit::ServiceIdentity;
use async_trait::async_trait;

use super::settings::Settings;

/// Where a service's settings record lives between agent runs.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `None` when the service was never created.
    async fn load(&self, identity: &ServiceIdentity) -> anyhow::Result<Option<Settings>>;

    async fn save(&self, identity: &ServiceIdentity, settings: &Settings) -> anyhow::Result<()>;
}
