//! Builder side of the agent: create, update, build and deploy.

use std::sync::Arc;

use agentkit::lifecycle::{Lifecycle, LifecycleError, Phase};
use agentkit::network::summary;
use agentkit::{CallCtx, NetworkScope, ProviderInformation};
use agentkit_utils::SecretString;
use tracing::Instrument;

use crate::config::RedisAgentConfig;

use super::PROVIDER_NAME;
use super::deploy::{
    DeploymentParameters, DeploymentTarget, ManifestRenderer, ReadSelector, kustomize_plan,
    secret_env,
};
use super::error::AgentError;
use super::exporter::connection_string;
use super::information::{AgentInformation, agent_information, getting_started};
use super::repo::SettingsStore;
use super::requests::{
    BuilderInitResponse, CreateRequest, DeployRequest, DeployResponse, InitRequest, LoadRequest,
    LoadResponse, SettingsResponse, UpdateRequest,
};
use super::service::LoadedService;
use super::settings::Settings;
use super::topology::{Topology, instance_for_scope};

pub struct Builder {
    config: Arc<RedisAgentConfig>,
    store: Arc<dyn SettingsStore>,
    renderer: Arc<dyn ManifestRenderer>,
    lifecycle: Lifecycle,
    service: Option<Arc<LoadedService>>,
    topology: Option<Topology>,
    password: Option<SecretString>,
}

impl Builder {
    #[must_use]
    pub fn new(
        config: Arc<RedisAgentConfig>,
        store: Arc<dyn SettingsStore>,
        renderer: Arc<dyn ManifestRenderer>,
    ) -> Self {
        Self {
            config,
            store,
            renderer,
            lifecycle: Lifecycle::default(),
            service: None,
            topology: None,
            password: None,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// The loaded service, shared with a runtime through [`Runtime::adopt`].
    ///
    /// [`Runtime::adopt`]: super::runtime::Runtime::adopt
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<LoadedService>> {
        self.service.clone()
    }

    fn loaded(&self, phase: Phase) -> Result<&Arc<LoadedService>, AgentError> {
        self.lifecycle.check(phase)?;
        self.service
            .as_ref()
            .ok_or(AgentError::Lifecycle(LifecycleError::NotLoaded { phase }))
    }

    /// # Errors
    /// [`AgentError::Persistence`] or [`AgentError::InvalidSettings`].
    pub async fn load(
        &mut self,
        ctx: &CallCtx,
        request: LoadRequest,
    ) -> Result<LoadResponse, AgentError> {
        let ctx = ctx.for_phase(&request.identity.unique(), Phase::Load.as_str());

        let service = LoadedService::load(self.store.as_ref(), request)
            .instrument(ctx.span().clone())
            .await?;
        ctx.span()
            .in_scope(|| tracing::info!(created = service.created, "Phase: load"));

        let text = getting_started(&service.identity, &service.settings);
        let endpoints = service.endpoints.all();
        self.lifecycle.on_loaded(service.created);
        self.service = Some(Arc::new(service));

        Ok(LoadResponse {
            endpoints,
            state: self.lifecycle.state(),
            getting_started: Some(text),
        })
    }

    /// Decide the replica topology and persist the service definition.
    ///
    /// # Errors
    /// [`AgentError::Lifecycle`] when not loaded or already created,
    /// [`AgentError::Persistence`] when saving fails.
    pub async fn create(
        &mut self,
        ctx: &CallCtx,
        request: CreateRequest,
    ) -> Result<SettingsResponse, AgentError> {
        let service = Arc::clone(self.loaded(Phase::Create)?);
        let ctx = ctx.for_phase(&service.identity.unique(), Phase::Create.as_str());

        let read_replica = request
            .read_replica
            .unwrap_or(self.config.default_read_replica);
        let settings = Settings {
            read_replica,
            ..service.settings.clone()
        };

        self.persist(&service, settings.clone())
            .instrument(ctx.span().clone())
            .await?;
        self.lifecycle.on_created();
        ctx.span()
            .in_scope(|| tracing::info!(read_replica, "Phase: create"));
        Ok(SettingsResponse { settings })
    }

    /// # Errors
    /// [`AgentError::Lifecycle`] when not loaded, [`AgentError::Persistence`]
    /// when saving fails.
    pub async fn update(
        &mut self,
        ctx: &CallCtx,
        request: UpdateRequest,
    ) -> Result<SettingsResponse, AgentError> {
        let service = Arc::clone(self.loaded(Phase::Update)?);
        let ctx = ctx.for_phase(&service.identity.unique(), Phase::Update.as_str());

        if request.patch.is_empty() {
            return Ok(SettingsResponse {
                settings: service.settings.clone(),
            });
        }

        let settings = request.patch.apply(&service.settings);
        self.persist(&service, settings.clone())
            .instrument(ctx.span().clone())
            .await?;
        self.lifecycle.on_created();
        ctx.span()
            .in_scope(|| tracing::info!(?settings, "Phase: update"));
        Ok(SettingsResponse { settings })
    }

    async fn persist(&mut self, service: &LoadedService, settings: Settings) -> Result<(), AgentError> {
        self.store
            .save(&service.identity, &settings)
            .await
            .map_err(|e| AgentError::persistence("save", &e))?;
        self.service = Some(Arc::new(service.with_settings(settings)));
        Ok(())
    }

    /// The image is pulled, never built.
    ///
    /// # Errors
    /// [`AgentError::Lifecycle`] when not loaded.
    pub fn build(&self, ctx: &CallCtx) -> Result<(), AgentError> {
        let service = self.loaded(Phase::Build)?;
        let ctx = ctx.for_phase(&service.identity.unique(), Phase::Build.as_str());
        let _guard = ctx.span().enter();
        tracing::debug!("Phase: build (nothing to build)");
        Ok(())
    }

    /// Resolve the endpoints and publish the connection strings.
    ///
    /// # Errors
    /// [`AgentError::Network`] when a required mapping or instance is missing.
    pub fn init(
        &mut self,
        ctx: &CallCtx,
        request: &InitRequest,
    ) -> Result<BuilderInitResponse, AgentError> {
        let service = Arc::clone(self.loaded(Phase::Init)?);
        let ctx = ctx.for_phase(&service.identity.unique(), Phase::Init.as_str());
        let _guard = ctx.span().enter();

        tracing::debug!(proposed = %summary(&request.proposed_mappings), "Phase: init");

        let topology = Topology::resolve(
            &request.proposed_mappings,
            &service.endpoints,
            service.settings.read_replica,
        )
        .map_err(|e| AgentError::network(Phase::Init, e))?;

        let password = service.password(&request.provider_infos);
        let secret = password.as_ref().map(SecretString::expose);
        let write = connection_string(
            topology
                .write_native()
                .map_err(|e| AgentError::network(Phase::Init, e))?,
            secret,
        );
        let read = connection_string(
            topology
                .read_native()
                .map_err(|e| AgentError::network(Phase::Init, e))?,
            secret,
        );

        let published = ProviderInformation::new(PROVIDER_NAME, service.identity.unique())
            .with("write", write)
            .with("read", read);

        let mappings = topology.mappings();
        self.topology = Some(topology);
        self.password = password;
        self.lifecycle.on_initialized();

        Ok(BuilderInitResponse {
            mappings,
            provider_infos: vec![published],
        })
    }

    /// Compute the deployment parameters and render them for `request.target`.
    ///
    /// Connection strings use the container-scope addresses: deployed
    /// consumers run inside the container network.
    ///
    /// # Errors
    /// [`AgentError::Lifecycle`] before a successful init,
    /// [`AgentError::Render`] when the renderer fails.
    pub async fn deploy(
        &self,
        ctx: &CallCtx,
        request: DeployRequest,
    ) -> Result<DeployResponse, AgentError> {
        let service = self.loaded(Phase::Deploy)?;
        let topology = self
            .topology
            .as_ref()
            .ok_or(AgentError::Lifecycle(LifecycleError::NotInitialized {
                phase: Phase::Deploy,
                state: self.lifecycle.state(),
            }))?;
        let ctx = ctx.for_phase(&service.identity.unique(), Phase::Deploy.as_str());

        let alias = &self.config.docker_host_alias;
        let secret = self.password.as_ref().map(SecretString::expose);
        let write = instance_for_scope(&topology.write, NetworkScope::Container, alias)
            .map_err(|e| AgentError::network(Phase::Deploy, e))?;
        let read = instance_for_scope(&topology.read, NetworkScope::Container, alias)
            .map_err(|e| AgentError::network(Phase::Deploy, e))?;

        let parameters = DeploymentParameters {
            image: self.config.image.image_ref(),
            replica_count: service.settings.replica_count(),
            read_selector: ReadSelector::for_settings(&service.settings),
            environment: request.environment.clone(),
            namespace: request.namespace.clone(),
            secrets: secret_env(
                &service.identity.unique(),
                &connection_string(&write, secret),
                &connection_string(&read, secret),
            ),
        };

        let mut rendered = Vec::new();
        match &request.target {
            DeploymentTarget::Kustomize(target) => {
                for (template, destination) in kustomize_plan(
                    target,
                    &service.identity,
                    &request.environment,
                    &service.settings,
                ) {
                    self.renderer
                        .render(template, &destination, &parameters)
                        .instrument(ctx.span().clone())
                        .await
                        .map_err(|e| AgentError::Render {
                            template: template.as_str().to_owned(),
                            reason: format!("{e:#}"),
                        })?;
                    ctx.span().in_scope(|| {
                        tracing::debug!(template = template.as_str(), destination = %destination.display(), "Rendered manifests");
                    });
                    rendered.push(destination);
                }
            }
        }

        ctx.span().in_scope(|| {
            tracing::info!(environment = %request.environment, replicas = parameters.replica_count, "Phase: deploy");
        });
        Ok(DeployResponse {
            parameters,
            rendered,
        })
    }

    #[must_use]
    pub fn information(&self, _ctx: &CallCtx) -> AgentInformation {
        agent_information()
    }
}
