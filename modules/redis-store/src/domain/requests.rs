//! Inputs and outputs of the lifecycle phases.

use std::path::PathBuf;

use agentkit::lifecycle::LifecycleState;
use agentkit::{
    AggregateStopError, Endpoint, ExportedConfiguration, NetworkMapping, ProviderInformation,
    ServiceIdentity,
};
use serde::{Deserialize, Serialize};

use super::deploy::{DeploymentParameters, DeploymentTarget};
use super::settings::{Settings, SettingsPatch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub identity: ServiceIdentity,
    /// Settings handed over by the platform; the persisted record is used
    /// when absent.
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

impl LoadRequest {
    #[must_use]
    pub fn new(identity: ServiceIdentity) -> Self {
        Self {
            identity,
            settings: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResponse {
    pub endpoints: Vec<Endpoint>,
    pub state: LifecycleState,
    /// Only filled by the builder.
    pub getting_started: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Answer to "Read replicas?"; the configured default when `None`.
    pub read_replica: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub patch: SettingsPatch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    pub proposed_mappings: Vec<NetworkMapping>,
    #[serde(default)]
    pub provider_infos: Vec<ProviderInformation>,
}

impl InitRequest {
    #[must_use]
    pub fn new(proposed_mappings: Vec<NetworkMapping>) -> Self {
        Self {
            proposed_mappings,
            provider_infos: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_provider_info(mut self, info: ProviderInformation) -> Self {
        self.provider_infos.push(info);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderInitResponse {
    pub mappings: Vec<NetworkMapping>,
    /// What this service publishes for its dependents.
    pub provider_infos: Vec<ProviderInformation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInitResponse {
    pub mappings: Vec<NetworkMapping>,
    pub exported: ExportedConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub environment: String,
    #[serde(default)]
    pub namespace: String,
    pub target: DeploymentTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub parameters: DeploymentParameters,
    pub rendered: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopResponse {
    /// Persistence is on: nothing was stopped.
    pub skipped: bool,
    pub errors: Option<AggregateStopError>,
}

impl StopResponse {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub settings: Settings,
}
