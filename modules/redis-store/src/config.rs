//! Configuration for the Redis service agent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agentkit::config::{ConfigError, load_layered};
use agentkit::telemetry::LoggingConfig;
use agentkit::{DockerOptions, ImageRef, ReadinessPolicy};
use serde::{Deserialize, Serialize};

/// Environment prefix; `__` separates nested keys.
pub const ENV_PREFIX: &str = "REDIS_AGENT__";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct RedisAgentConfig {
    pub image: ImageConfig,
    /// Port the server listens on inside its container.
    pub container_port: u16,
    /// Hostname a container uses to reach ports published on the host.
    pub docker_host_alias: String,
    /// Answer used when `Create` does not say whether to add a read replica.
    pub default_read_replica: bool,
    pub readiness: ReadinessConfig,
    pub docker: DockerConfig,
    pub logging: LoggingConfig,
}

impl Default for RedisAgentConfig {
    fn default() -> Self {
        Self {
            image: ImageConfig::default(),
            container_port: 6379,
            docker_host_alias: "host.docker.internal".to_owned(),
            default_read_replica: true,
            readiness: ReadinessConfig::default(),
            docker: DockerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RedisAgentConfig {
    /// Defaults, then `file` (YAML) if given, then `REDIS_AGENT__*` variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file is missing or a layer is invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        load_layered(file, ENV_PREFIX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ImageConfig {
    pub name: String,
    pub tag: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            name: "redis".to_owned(),
            tag: "latest".to_owned(),
        }
    }
}

impl ImageConfig {
    #[must_use]
    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(self.name.clone(), self.tag.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ReadinessConfig {
    pub attempts: u32,
    #[serde(with = "agentkit_utils::humantime_serde")]
    pub backoff: Duration,
    /// Bound on a single connect + PING round trip.
    #[serde(with = "agentkit_utils::humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(500),
        }
    }
}

impl ReadinessConfig {
    #[must_use]
    pub fn policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(self.attempts, self.backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct DockerConfig {
    pub binary: PathBuf,
    #[serde(with = "agentkit_utils::humantime_serde")]
    pub stop_grace: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        let options = DockerOptions::default();
        Self {
            binary: options.binary,
            stop_grace: options.stop_grace,
        }
    }
}

impl DockerConfig {
    #[must_use]
    pub fn options(&self) -> DockerOptions {
        DockerOptions {
            binary: self.binary.clone(),
            stop_grace: self.stop_grace,
        }
    }
}
