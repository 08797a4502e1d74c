//! Wiring: one [`RedisAgent`] hands out builder and runtime halves that
//! share configuration, settings store and container runtime.

use std::sync::Arc;

use agentkit::{ContainerRuntime, DockerCliBackend, ReadinessProbe, Supervisor};
use tokio_util::sync::CancellationToken;

use crate::config::RedisAgentConfig;
use crate::domain::builder::Builder;
use crate::domain::deploy::ManifestRenderer;
use crate::domain::repo::SettingsStore;
use crate::domain::runtime::Runtime;
use crate::infra::manifest::JsonManifestRenderer;
use crate::infra::probe::RedisPingProbe;
use crate::infra::settings_store::YamlSettingsStore;

pub struct RedisAgent {
    config: Arc<RedisAgentConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn ReadinessProbe>,
    store: Arc<dyn SettingsStore>,
    renderer: Arc<dyn ManifestRenderer>,
}

impl RedisAgent {
    #[must_use]
    pub fn new(
        config: RedisAgentConfig,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ReadinessProbe>,
        store: Arc<dyn SettingsStore>,
        renderer: Arc<dyn ManifestRenderer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            runtime,
            probe,
            store,
            renderer,
        }
    }

    /// Production wiring: docker CLI, PING probe, YAML settings next to the
    /// service definition. Containers are stopped when `cancel` fires.
    #[must_use]
    pub fn with_docker(config: RedisAgentConfig, cancel: CancellationToken) -> Self {
        let runtime = Arc::new(DockerCliBackend::new(cancel, config.docker.options()));
        let probe = Arc::new(RedisPingProbe::new(config.readiness.probe_timeout));
        tracing::info!(
            image = %config.image.image_ref(),
            docker = %config.docker.binary.display(),
            "Redis agent wired to docker"
        );
        Self::new(
            config,
            runtime,
            probe,
            Arc::new(YamlSettingsStore),
            Arc::new(JsonManifestRenderer),
        )
    }

    #[must_use]
    pub fn config(&self) -> &RedisAgentConfig {
        &self.config
    }

    #[must_use]
    pub fn builder(&self) -> Builder {
        Builder::new(
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            Arc::clone(&self.renderer),
        )
    }

    #[must_use]
    pub fn runtime(&self) -> Runtime {
        let supervisor = Supervisor::new(
            Arc::clone(&self.runtime),
            Arc::clone(&self.probe),
            self.config.readiness.policy(),
        );
        Runtime::new(Arc::clone(&self.config), Arc::clone(&self.store), supervisor)
    }
}
