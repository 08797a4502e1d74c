//! Runtime side of the agent: runs the servers locally.

use std::collections::BTreeMap;
use std::sync::Arc;

use agentkit::lifecycle::{Lifecycle, LifecycleError, Phase};
use agentkit::network::summary;
use agentkit::{CallCtx, ExportedConfiguration, NetworkMapping, Runner, Supervisor};
use agentkit_utils::SecretString;
use tracing::Instrument;

use crate::config::RedisAgentConfig;

use super::error::AgentError;
use super::exporter::export_topology;
use super::information::{RunnerStatus, RuntimeStatus};
use super::repo::SettingsStore;
use super::requests::{InitRequest, LoadRequest, LoadResponse, RuntimeInitResponse, StopResponse};
use super::runners::RunnerPlan;
use super::service::LoadedService;
use super::topology::Topology;

pub struct Runtime {
    config: Arc<RedisAgentConfig>,
    store: Arc<dyn SettingsStore>,
    lifecycle: Lifecycle,
    service: Option<Arc<LoadedService>>,
    supervisor: Supervisor,
    mappings: Vec<NetworkMapping>,
    exported: ExportedConfiguration,
}

impl Runtime {
    /// `supervisor` must be empty; it carries the container runtime, the
    /// readiness probe and the policy used for every runner.
    #[must_use]
    pub fn new(
        config: Arc<RedisAgentConfig>,
        store: Arc<dyn SettingsStore>,
        supervisor: Supervisor,
    ) -> Self {
        Self {
            config,
            store,
            lifecycle: Lifecycle::default(),
            service: None,
            supervisor,
            mappings: Vec::new(),
            exported: ExportedConfiguration::default(),
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Mappings resolved by the last successful `Init`, write first.
    #[must_use]
    pub fn mappings(&self) -> &[NetworkMapping] {
        &self.mappings
    }

    #[must_use]
    pub fn exported(&self) -> &ExportedConfiguration {
        &self.exported
    }

    #[must_use]
    pub fn runners(&self) -> &[Runner] {
        self.supervisor.runners()
    }

    fn loaded(&self, phase: Phase) -> Result<Arc<LoadedService>, AgentError> {
        self.lifecycle.check(phase)?;
        self.service
            .clone()
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
        ctx.span().in_scope(|| {
            tracing::info!(created = service.created, settings = ?service.settings, "Phase: load");
        });
        Ok(self.adopt(Arc::new(service)))
    }

    /// Load from a snapshot another agent half already loaded.
    pub fn adopt(&mut self, service: Arc<LoadedService>) -> LoadResponse {
        let endpoints = service.endpoints.all();
        self.lifecycle.on_loaded(service.created);
        self.service = Some(service);
        LoadResponse {
            endpoints,
            state: self.lifecycle.state(),
            getting_started: None,
        }
    }

    /// Resolve the topology, define the runners and compute the exported
    /// configuration.
    ///
    /// Everything is built aside first: a failing `Init` leaves the previous
    /// runners, mappings and configuration untouched. A successful one stops
    /// the previous runners and replaces all three.
    ///
    /// # Errors
    /// [`AgentError::Network`] for a missing mapping or instance,
    /// [`AgentError::Supervisor`] when the container runtime rejects a runner,
    /// [`AgentError::Teardown`] when previous runners cannot be stopped.
    pub async fn init(
        &mut self,
        ctx: &CallCtx,
        request: InitRequest,
    ) -> Result<RuntimeInitResponse, AgentError> {
        let service = self.loaded(Phase::Init)?;
        let origin = service.identity.unique();
        let ctx = ctx.for_phase(&origin, Phase::Init.as_str());
        let span = ctx.span().clone();

        async {
            tracing::debug!(proposed = %summary(&request.proposed_mappings), "Phase: init");

            let network = |e| AgentError::network(Phase::Init, e);
            let topology = Topology::resolve(
                &request.proposed_mappings,
                &service.endpoints,
                service.settings.read_replica,
            )
            .map_err(network)?;

            let env: BTreeMap<String, String> = request
                .provider_infos
                .iter()
                .flat_map(agentkit::ProviderInformation::as_env)
                .collect();

            let plan = RunnerPlan {
                identity: &service.identity,
                settings: &service.settings,
                image: self.config.image.image_ref(),
                container_port: self.config.container_port,
                docker_host_alias: &self.config.docker_host_alias,
                env,
            };
            let definitions = plan.definitions(&topology).map_err(network)?;

            let mut supervisor = self.supervisor.fresh();
            for definition in definitions {
                supervisor
                    .init(definition)
                    .await
                    .map_err(|e| AgentError::supervisor(Phase::Init, e))?;
            }

            let password = service.password(&request.provider_infos);
            let exported = export_topology(
                &topology,
                password.as_ref().map(SecretString::expose),
                &self.config.docker_host_alias,
            )
            .map_err(network)?;
            let write = topology.write_native().map_err(network)?.address();

            self.supervisor
                .stop()
                .await
                .map_err(|source| AgentError::Teardown {
                    phase: Phase::Init,
                    source,
                })?;

            ctx.status(&origin, &format!("will run on: {write}"));

            self.supervisor = supervisor;
            self.mappings = topology.mappings();
            self.exported = exported;
            self.lifecycle.on_initialized();

            tracing::info!(runners = self.supervisor.runners().len(), "Phase: init");
            Ok::<_, AgentError>(RuntimeInitResponse {
                mappings: self.mappings.clone(),
                exported: self.exported.clone(),
            })
        }
        .instrument(span)
        .await
    }

    /// Start the runners in order, waiting for each to answer.
    ///
    /// Runners still running from an earlier attempt are kept, so retrying
    /// after a failure only starts what is missing.
    ///
    /// # Errors
    /// [`AgentError::Supervisor`] on start failure, readiness exhaustion or
    /// cancellation.
    pub async fn start(&mut self, ctx: &CallCtx) -> Result<(), AgentError> {
        let service = self.loaded(Phase::Start)?;
        let origin = service.identity.unique();
        let ctx = ctx.for_phase(&origin, Phase::Start.as_str());

        self.supervisor
            .start(&ctx)
            .instrument(ctx.span().clone())
            .await
            .map_err(|e| AgentError::supervisor(Phase::Start, e))?;

        self.lifecycle.on_started();
        ctx.status(
            &origin,
            &format!("started {} runner(s)", self.supervisor.running_count()),
        );
        ctx.span().in_scope(|| tracing::info!("Phase: start"));
        Ok(())
    }

    /// Stop the runners. With persistence on, nothing is stopped.
    ///
    /// Stop failures are reported in the response; every runner is attempted.
    ///
    /// # Errors
    /// [`AgentError::Lifecycle`] when called before `Init`.
    pub async fn stop(&mut self, ctx: &CallCtx) -> Result<StopResponse, AgentError> {
        let service = self.loaded(Phase::Stop)?;
        let ctx = ctx.for_phase(&service.identity.unique(), Phase::Stop.as_str());

        if service.settings.persist {
            ctx.span()
                .in_scope(|| tracing::info!("Phase: stop (skipped, persistence is on)"));
            self.lifecycle.on_stopped();
            return Ok(StopResponse {
                skipped: true,
                errors: None,
            });
        }

        let errors = self
            .supervisor
            .stop()
            .instrument(ctx.span().clone())
            .await
            .err();
        self.lifecycle.on_stopped();
        ctx.span().in_scope(|| {
            tracing::info!(failures = errors.as_ref().map_or(0, |e| e.failures.len()), "Phase: stop");
        });
        Ok(StopResponse {
            skipped: false,
            errors,
        })
    }

    /// Stop every runner whatever the settings, and forget them.
    ///
    /// # Errors
    /// [`AgentError::Teardown`] listing the runners that failed to stop; the
    /// service is destroyed anyway.
    pub async fn destroy(&mut self, ctx: &CallCtx) -> Result<(), AgentError> {
        let origin = self
            .service
            .as_ref()
            .map_or_else(String::new, |s| s.identity.unique());
        let ctx = ctx.for_phase(&origin, Phase::Destroy.as_str());

        let result = self
            .supervisor
            .destroy()
            .instrument(ctx.span().clone())
            .await;
        self.mappings.clear();
        self.exported = ExportedConfiguration::default();
        self.lifecycle.on_destroyed();
        ctx.span().in_scope(|| tracing::info!("Phase: destroy"));

        result.map_err(|source| AgentError::Teardown {
            phase: Phase::Destroy,
            source,
        })
    }

    #[must_use]
    pub fn information(&self, _ctx: &CallCtx) -> RuntimeStatus {
        RuntimeStatus {
            state: self.lifecycle.state(),
            creation: self.lifecycle.creation(),
            runners: self
                .supervisor
                .runners()
                .iter()
                .map(|r| RunnerStatus {
                    name: r.name().to_owned(),
                    state: r.state(),
                })
                .collect(),
        }
    }
}
