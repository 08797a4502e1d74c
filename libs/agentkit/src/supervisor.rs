//! Runner supervisor.
//!
//! Owns the handles of every process a service agent runs. Runners are kept in
//! append order; the first appended runner is started first and stopped last.
//!
//! Start is fail-fast without rollback, teardown visits every runner and
//! aggregates failures.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backends::{ContainerRuntime, InstanceHandle, ReadinessTarget, RunnerDefinition};
use crate::context::CallCtx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Defined,
    Initialized,
    Running,
    Stopped,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunnerState::Defined => "defined",
            RunnerState::Initialized => "initialized",
            RunnerState::Running => "running",
            RunnerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// One supervised process.
#[derive(Debug)]
pub struct Runner {
    definition: RunnerDefinition,
    state: RunnerState,
    handle: Option<InstanceHandle>,
}

impl Runner {
    #[must_use]
    pub fn new(definition: RunnerDefinition) -> Self {
        Self {
            definition,
            state: RunnerState::Defined,
            handle: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    #[must_use]
    pub fn definition(&self) -> &RunnerDefinition {
        &self.definition
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.state
    }
}

/// Checks whether a started runner is serving.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// One attempt. Implementations bound their own I/O.
    async fn probe(&self, target: &ReadinessTarget) -> anyhow::Result<()>;
}

/// Bounded retries with a fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    attempts: u32,
    backoff: Duration,
}

impl ReadinessPolicy {
    /// `attempts` is clamped to at least one.
    #[must_use]
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopFailure {
    pub runner: String,
    pub reason: String,
}

/// Every runner that failed to stop. All runners were still attempted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{} runner(s) failed to stop{}", .failures.len(), render_failures(.failures))]
pub struct AggregateStopError {
    pub failures: Vec<StopFailure>,
}

fn render_failures(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("; {}: {}", f.runner, f.reason))
        .collect()
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("runner '{runner}' rejected by the container runtime: {reason}")]
    RunnerInit { runner: String, reason: String },
    #[error("runner '{runner}' failed to start: {reason}")]
    RunnerStart { runner: String, reason: String },
    #[error(
        "runner '{runner}' not ready at {target} after {attempts} attempt(s): {last_error}"
    )]
    ReadinessTimeout {
        runner: String,
        target: String,
        attempts: u32,
        last_error: String,
    },
    #[error("host port {port} of runner '{runner}' is already published by '{owner}'")]
    DuplicateHostPort {
        runner: String,
        owner: String,
        port: u16,
    },
    #[error("start cancelled while handling runner '{runner}'")]
    Cancelled { runner: String },
}

pub struct Supervisor {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn ReadinessProbe>,
    policy: ReadinessPolicy,
    runners: Vec<Runner>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("backend", &self.runtime.kind())
            .field("policy", &self.policy)
            .field("runners", &self.runners)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ReadinessProbe>,
        policy: ReadinessPolicy,
    ) -> Self {
        Self {
            runtime,
            probe,
            policy,
            runners: Vec::new(),
        }
    }

    /// Empty supervisor sharing this one's runtime, probe and policy.
    #[must_use]
    pub fn fresh(&self) -> Self {
        Self::new(
            Arc::clone(&self.runtime),
            Arc::clone(&self.probe),
            self.policy,
        )
    }

    #[must_use]
    pub fn runners(&self) -> &[Runner] {
        &self.runners
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.runners
            .iter()
            .filter(|r| r.state == RunnerState::Running)
            .count()
    }

    /// Validate `definition` and append it. Never starts anything.
    ///
    /// # Errors
    /// [`SupervisorError::DuplicateHostPort`] when another runner already
    /// publishes one of its host ports, [`SupervisorError::RunnerInit`] when
    /// the runtime rejects it.
    pub async fn init(&mut self, definition: RunnerDefinition) -> Result<(), SupervisorError> {
        for port in &definition.ports {
            if let Some(owner) = self
                .runners
                .iter()
                .find(|r| r.definition.ports.iter().any(|p| p.host == port.host))
            {
                return Err(SupervisorError::DuplicateHostPort {
                    runner: definition.name.clone(),
                    owner: owner.name().to_owned(),
                    port: port.host,
                });
            }
        }

        self.runtime
            .prepare(&definition)
            .await
            .map_err(|e| SupervisorError::RunnerInit {
                runner: definition.name.clone(),
                reason: format!("{e:#}"),
            })?;

        tracing::debug!(runner = %definition.name, image = %definition.image, "Runner initialized");

        let mut runner = Runner::new(definition);
        runner.state = RunnerState::Initialized;
        self.runners.push(runner);
        Ok(())
    }

    /// Start every runner that is not running yet, in append order, waiting
    /// for readiness after each one.
    ///
    /// Runners already running are left alone, so a retry after a failure
    /// only starts what is missing.
    ///
    /// # Errors
    /// The first start or readiness failure. On cancellation, observed before
    /// a launch, after it or while waiting for readiness, runners launched by
    /// this call are stopped best-effort and [`SupervisorError::Cancelled`] is
    /// returned.
    pub async fn start(&mut self, ctx: &CallCtx) -> Result<(), SupervisorError> {
        let mut launched: Vec<usize> = Vec::new();

        for idx in 0..self.runners.len() {
            if self.runners[idx].state == RunnerState::Running {
                continue;
            }
            let name = self.runners[idx].name().to_owned();

            if ctx.is_cancelled() {
                self.abort(&launched).await;
                return Err(SupervisorError::Cancelled { runner: name });
            }

            let handle = self
                .runtime
                .start_image(&self.runners[idx].definition)
                .await
                .map_err(|e| SupervisorError::RunnerStart {
                    runner: name.clone(),
                    reason: format!("{e:#}"),
                })?;

            tracing::info!(runner = %name, instance_id = %handle.instance_id, "Runner started");
            let runner = &mut self.runners[idx];
            runner.handle = Some(handle);
            runner.state = RunnerState::Running;
            launched.push(idx);

            if let Some(target) = self.runners[idx].definition.readiness.clone() {
                match self.wait_ready(&name, &target, ctx).await {
                    Ok(()) | Err(SupervisorError::Cancelled { .. }) => {}
                    Err(e) => return Err(e),
                }
            }

            // the token may have fired while the launch or the last probe was in flight
            if ctx.is_cancelled() {
                self.abort(&launched).await;
                return Err(SupervisorError::Cancelled { runner: name });
            }
        }
        Ok(())
    }

    /// Stop every running runner, last appended first.
    ///
    /// Runners that are not running count as stopped. A runner whose stop
    /// fails keeps its handle so a later call can retry.
    ///
    /// # Errors
    /// [`AggregateStopError`] listing every runner that failed to stop.
    pub async fn stop(&mut self) -> Result<(), AggregateStopError> {
        let mut failures = Vec::new();

        for runner in self.runners.iter_mut().rev() {
            let Some(handle) = runner.handle.as_ref() else {
                if runner.state == RunnerState::Running {
                    runner.state = RunnerState::Stopped;
                }
                continue;
            };

            match self.runtime.stop_instance(handle).await {
                Ok(()) => {
                    tracing::info!(runner = %runner.definition.name, "Runner stopped");
                    runner.handle = None;
                    runner.state = RunnerState::Stopped;
                }
                Err(e) => {
                    tracing::warn!(runner = %runner.definition.name, error = %e, "Runner failed to stop");
                    failures.push(StopFailure {
                        runner: runner.definition.name.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateStopError { failures })
        }
    }

    /// Stop everything and forget every runner, whatever the outcome.
    ///
    /// # Errors
    /// [`AggregateStopError`] listing every runner that failed to stop.
    pub async fn destroy(&mut self) -> Result<(), AggregateStopError> {
        let result = self.stop().await;
        self.runners.clear();
        result
    }

    async fn wait_ready(
        &self,
        runner: &str,
        target: &ReadinessTarget,
        ctx: &CallCtx,
    ) -> Result<(), SupervisorError> {
        let attempts = self.policy.attempts;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.probe.probe(target).await {
                Ok(()) => {
                    tracing::debug!(runner = %runner, target = %target, attempt, "Runner ready");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(runner = %runner, target = %target, attempt, error = %e, "Runner not ready yet");
                    last_error = format!("{e:#}");
                }
            }

            if attempt < attempts {
                tokio::select! {
                    () = ctx.cancellation().cancelled() => {
                        return Err(SupervisorError::Cancelled { runner: runner.to_owned() });
                    }
                    () = tokio::time::sleep(self.policy.backoff) => {}
                }
            }
        }

        Err(SupervisorError::ReadinessTimeout {
            runner: runner.to_owned(),
            target: target.to_string(),
            attempts,
            last_error,
        })
    }

    async fn abort(&mut self, launched: &[usize]) {
        for &idx in launched.iter().rev() {
            let runner = &mut self.runners[idx];
            let Some(handle) = runner.handle.as_ref() else {
                continue;
            };
            match self.runtime.stop_instance(handle).await {
                Ok(()) => {
                    runner.handle = None;
                    runner.state = RunnerState::Stopped;
                }
                Err(e) => {
                    tracing::warn!(runner = %runner.definition.name, error = %e, "Failed to stop runner after cancelled start");
                }
            }
        }
    }
}
