//! Docker CLI backend implementation
//!
//! Each runner is a `docker run --rm` child process. Output is piped into the
//! log forwarder; stopping asks the daemon to stop the container and then
//! reaps the CLI process.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::log_forwarder::{StreamKind, spawn_stream_forwarder};
use super::{BackendKind, ContainerRuntime, InstanceHandle, OutputSink, RunnerDefinition};

/// Grace period before force-killing the CLI process on shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Timeout for waiting on forwarder tasks during shutdown
const FORWARDER_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DockerOptions {
    pub binary: PathBuf,
    /// Passed to `docker stop -t`.
    pub stop_grace: Duration,
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docker"),
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// Send graceful termination signal to a child process.
///
/// Returns `false` if the process already exited, the PID does not fit an
/// `i32`, or signal delivery fails.
#[cfg(unix)]
fn send_terminate_signal(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };

    let Ok(pid_i32) = i32::try_from(pid) else {
        tracing::warn!(pid = pid, "PID exceeds i32::MAX, cannot send SIGTERM");
        return false;
    };

    kill(Pid::from_raw(pid_i32), Signal::SIGTERM).is_ok()
}

/// No reliable SIGTERM equivalent for console applications on Windows.
#[cfg(windows)]
fn send_terminate_signal(_child: &Child) -> bool {
    false
}

/// Stop the `docker run` process with graceful termination and timeout.
async fn stop_child_with_grace(
    child: &mut Child,
    handle: &InstanceHandle,
    grace: Duration,
    context: &str,
) {
    let pid = child.id();
    let sent = send_terminate_signal(child);

    tracing::debug!(
        runner = %handle.runner,
        instance_id = %handle.instance_id,
        pid = ?pid,
        graceful = sent,
        "{context}: sent termination signal"
    );

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(
                runner = %handle.runner,
                instance_id = %handle.instance_id,
                status = ?status,
                "{context}: docker cli exited"
            );
        }
        Ok(Err(e)) => {
            tracing::warn!(
                runner = %handle.runner,
                instance_id = %handle.instance_id,
                error = %e,
                "{context}: failed to wait for docker cli"
            );
        }
        Err(_) => {
            tracing::debug!(
                runner = %handle.runner,
                instance_id = %handle.instance_id,
                "{context}: grace period expired, force killing"
            );
            if let Err(e) = child.kill().await {
                tracing::warn!(
                    runner = %handle.runner,
                    instance_id = %handle.instance_id,
                    error = %e,
                    "{context}: failed to force kill"
                );
            }
        }
    }
}

async fn wait_forwarder(handle: Option<JoinHandle<()>>) {
    if let Some(h) = handle {
        let _ = tokio::time::timeout(FORWARDER_DRAIN_TIMEOUT, h).await;
    }
}

/// Container names only allow `[a-zA-Z0-9_.-]`.
fn container_name(runner: &str, instance_id: Uuid) -> String {
    let base: String = runner
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let id = instance_id.simple().to_string();
    format!("agentkit-{}-{}", base.trim_matches('-'), &id[..8])
}

/// Arguments for `docker run`, excluding the binary itself.
fn run_args(definition: &RunnerDefinition, container: &str) -> Vec<String> {
    let mut args = vec![
        "run".to_owned(),
        "--rm".to_owned(),
        "--name".to_owned(),
        container.to_owned(),
        "--add-host".to_owned(),
        "host.docker.internal:host-gateway".to_owned(),
    ];
    for port in &definition.ports {
        args.push("-p".to_owned());
        args.push(format!("{}:{}", port.host, port.container));
    }
    if let Some(volume) = &definition.volume {
        args.push("-v".to_owned());
        args.push(format!("{}:{}", volume.name, volume.target));
    }
    for (key, value) in &definition.env {
        args.push("-e".to_owned());
        args.push(format!("{key}={value}"));
    }
    args.push(definition.image.to_string());
    args.extend(definition.command.iter().cloned());
    args
}

struct DockerInstance {
    handle: InstanceHandle,
    container: String,
    child: Child,
    stdout_forwarder: Option<JoinHandle<()>>,
    stderr_forwarder: Option<JoinHandle<()>>,
}

type InstanceMap = HashMap<Uuid, DockerInstance>;

/// Backend that runs containers through the `docker` CLI.
///
/// When the cancellation token is triggered every tracked container is
/// stopped and its CLI process reaped.
pub struct DockerCliBackend {
    instances: Arc<RwLock<InstanceMap>>,
    options: DockerOptions,
    cancel: CancellationToken,
}

impl DockerCliBackend {
    /// Create a backend bound to `cancel`. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(cancel: CancellationToken, options: DockerOptions) -> Self {
        let backend = Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
            options: options.clone(),
            cancel: cancel.clone(),
        };

        let instances = Arc::clone(&backend.instances);
        tokio::spawn(async move {
            cancel.cancelled().await;
            tracing::info!("DockerCliBackend: shutdown signal received, stopping all containers");
            Self::shutdown_all_instances(instances, &options).await;
        });

        backend
    }

    async fn docker_stop(options: &DockerOptions, container: &str) -> Result<()> {
        let grace = options.stop_grace.as_secs().max(1).to_string();
        let output = Command::new(&options.binary)
            .args(["stop", "-t", grace.as_str(), container])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to run {} stop", options.binary.display()))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // --rm removes the container as soon as it exits
        if stderr.contains("No such container") {
            return Ok(());
        }
        bail!("docker stop {container} failed: {}", stderr.trim())
    }

    async fn shutdown_all_instances(instances: Arc<RwLock<InstanceMap>>, options: &DockerOptions) {
        let mut all: Vec<DockerInstance> = {
            let mut guard = instances.write();
            guard.drain().map(|(_, inst)| inst).collect()
        };

        if all.is_empty() {
            return;
        }

        tracing::info!(count = all.len(), "Stopping containers");

        for inst in &mut all {
            if let Err(e) = Self::docker_stop(options, &inst.container).await {
                tracing::warn!(runner = %inst.handle.runner, error = %e, "shutdown: docker stop failed");
            }
            stop_child_with_grace(
                &mut inst.child,
                &inst.handle,
                SHUTDOWN_GRACE_PERIOD,
                "shutdown",
            )
            .await;
        }

        for inst in all {
            wait_forwarder(inst.stdout_forwarder).await;
            wait_forwarder(inst.stderr_forwarder).await;
        }

        tracing::info!("All containers stopped");
    }
}

#[async_trait]
impl ContainerRuntime for DockerCliBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DockerCli
    }

    async fn prepare(&self, definition: &RunnerDefinition) -> Result<()> {
        let image = &definition.image;
        if image.name.is_empty() || image.name.contains(char::is_whitespace) {
            bail!("invalid image name '{}'", image.name);
        }
        if image.tag.is_empty() || image.tag.contains(char::is_whitespace) {
            bail!("invalid image tag '{}' for {}", image.tag, image.name);
        }
        if let Some(volume) = &definition.volume
            && !volume.target.starts_with('/')
        {
            bail!("volume target must be absolute, got '{}'", volume.target);
        }
        Ok(())
    }

    async fn start_image(&self, definition: &RunnerDefinition) -> Result<InstanceHandle> {
        let instance_id = Uuid::now_v7();
        let container = container_name(&definition.name, instance_id);

        let mut cmd = Command::new(&self.options.binary);
        cmd.args(run_args(definition, &container));
        match definition.output {
            OutputSink::Forward { .. } => {
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::piped());
            }
            OutputSink::Silent => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
        }

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {} for {}",
                self.options.binary.display(),
                definition.image
            )
        })?;

        let pid = child.id();

        let (stdout_forwarder, stderr_forwarder) = match &definition.output {
            OutputSink::Forward { label } => {
                let stdout = child.stdout.take().map(|s| {
                    spawn_stream_forwarder(
                        s,
                        label.clone(),
                        instance_id,
                        self.cancel.clone(),
                        StreamKind::Stdout,
                    )
                });
                let stderr = child.stderr.take().map(|s| {
                    spawn_stream_forwarder(
                        s,
                        label.clone(),
                        instance_id,
                        self.cancel.clone(),
                        StreamKind::Stderr,
                    )
                });
                (stdout, stderr)
            }
            OutputSink::Silent => (None, None),
        };

        tracing::info!(
            runner = %definition.name,
            instance_id = %instance_id,
            container = %container,
            image = %definition.image,
            pid = ?pid,
            "Started container"
        );

        let handle = InstanceHandle {
            runner: definition.name.clone(),
            instance_id,
            backend: BackendKind::DockerCli,
            pid,
            created_at: std::time::Instant::now(),
        };

        self.instances.write().insert(
            instance_id,
            DockerInstance {
                handle: handle.clone(),
                container,
                child,
                stdout_forwarder,
                stderr_forwarder,
            },
        );

        Ok(handle)
    }

    async fn stop_instance(&self, handle: &InstanceHandle) -> Result<()> {
        let instance = self.instances.write().remove(&handle.instance_id);

        let Some(mut instance) = instance else {
            tracing::debug!(
                runner = %handle.runner,
                instance_id = %handle.instance_id,
                "stop_instance called for unknown instance, ignoring"
            );
            return Ok(());
        };

        let stopped = Self::docker_stop(&self.options, &instance.container).await;
        stop_child_with_grace(
            &mut instance.child,
            &instance.handle,
            self.options.stop_grace,
            "stop_instance",
        )
        .await;

        if let Err(e) = stopped {
            // keep tracking it so a later stop or shutdown can retry
            self.instances.write().insert(handle.instance_id, instance);
            return Err(e);
        }
        Ok(())
    }
}
