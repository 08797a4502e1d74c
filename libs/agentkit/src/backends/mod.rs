//! Container runtime abstraction.
//!
//! A backend can start an image with a port mapping and an optional command
//! override, and later stop the instance it returned. Image build and pull are
//! out of reach: the image reference must already be resolvable.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// The kind of backend used to run containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    DockerCli,
    Mock,
}

/// `name:tag` image reference.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    #[must_use]
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Host port published for a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub container: u16,
    pub host: u16,
}

/// Named volume mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub name: String,
    pub target: String,
}

/// Where a runner's stdout/stderr goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Forward each line into tracing under `label`.
    Forward { label: String },
    /// Discard output.
    Silent,
}

/// Address polled after start to decide the runner is serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessTarget {
    pub hostname: String,
    pub port: u16,
}

impl fmt::Display for ReadinessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Everything needed to run one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerDefinition {
    pub name: String,
    pub image: ImageRef,
    /// Empty means the image's default command.
    pub command: Vec<String>,
    pub ports: Vec<PortMapping>,
    pub env: BTreeMap<String, String>,
    pub volume: Option<VolumeMount>,
    pub output: OutputSink,
    pub readiness: Option<ReadinessTarget>,
}

impl RunnerDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, image: ImageRef) -> Self {
        let name = name.into();
        Self {
            output: OutputSink::Forward {
                label: name.clone(),
            },
            name,
            image,
            command: Vec::new(),
            ports: Vec::new(),
            env: BTreeMap::new(),
            volume: None,
            readiness: None,
        }
    }

    #[must_use]
    pub fn with_command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: PortMapping) -> Self {
        self.ports.push(port);
        self
    }

    #[must_use]
    pub fn with_env<I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(env);
        self
    }

    #[must_use]
    pub fn with_volume(mut self, volume: VolumeMount) -> Self {
        self.volume = Some(volume);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_silence(self) -> Self {
        self.with_output(OutputSink::Silent)
    }

    #[must_use]
    pub fn with_readiness(mut self, target: ReadinessTarget) -> Self {
        self.readiness = Some(target);
        self
    }
}

/// A handle to a running container instance
#[derive(Clone)]
pub struct InstanceHandle {
    pub runner: String,
    pub instance_id: Uuid,
    pub backend: BackendKind,
    pub pid: Option<u32>,
    pub created_at: Instant,
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("runner", &self.runner)
            .field("instance_id", &self.instance_id)
            .field("backend", &self.backend)
            .field("pid", &self.pid)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Trait for backends that can start and stop container instances
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Backend-specific validation of a definition. Must not start anything.
    async fn prepare(&self, definition: &RunnerDefinition) -> Result<()>;

    async fn start_image(&self, definition: &RunnerDefinition) -> Result<InstanceHandle>;

    /// Stopping an unknown or already stopped instance succeeds.
    async fn stop_instance(&self, handle: &InstanceHandle) -> Result<()>;
}

pub mod docker;
pub mod log_forwarder;
pub mod mock;

pub use docker::{DockerCliBackend, DockerOptions};
pub use mock::{MockRuntime, RuntimeCall};
