//! The loaded service snapshot shared by the builder and the runtime.

use agentkit::provider::find_provider_value;
use agentkit::{ProviderInformation, ServiceIdentity};
use agentkit_utils::SecretString;

use super::PROVIDER_NAME;
use super::endpoints::RedisEndpoints;
use super::error::AgentError;
use super::exporter::PASSWORD_KEY;
use super::repo::SettingsStore;
use super::requests::LoadRequest;
use super::settings::Settings;

/// Immutable once loaded; `Create` and `Update` produce a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedService {
    pub identity: ServiceIdentity,
    pub endpoints: RedisEndpoints,
    pub settings: Settings,
    /// A settings record was persisted for this service.
    pub created: bool,
}

impl LoadedService {
    /// Identity, endpoints and settings for `request`.
    ///
    /// # Errors
    /// [`AgentError::Persistence`] when the store cannot be read,
    /// [`AgentError::InvalidSettings`] for a malformed settings blob.
    pub async fn load(store: &dyn SettingsStore, request: LoadRequest) -> Result<Self, AgentError> {
        let stored = store
            .load(&request.identity)
            .await
            .map_err(|e| AgentError::persistence("load", &e))?;
        let created = stored.is_some();

        let settings = match request.settings {
            Some(blob) => serde_json::from_value(blob)
                .map_err(|e| AgentError::InvalidSettings(e.to_string()))?,
            None => stored.unwrap_or_default(),
        };

        Ok(Self {
            endpoints: RedisEndpoints::declare(&request.identity),
            identity: request.identity,
            settings,
            created,
        })
    }

    #[must_use]
    pub fn with_settings(&self, settings: Settings) -> Self {
        Self {
            settings,
            created: true,
            ..self.clone()
        }
    }

    /// Password published for this service by its provider information, if any.
    #[must_use]
    pub fn password(&self, infos: &[ProviderInformation]) -> Option<SecretString> {
        find_provider_value(infos, &self.identity.unique(), PROVIDER_NAME, PASSWORD_KEY)
            .filter(|p| !p.is_empty())
            .map(SecretString::new)
    }
}
