//! Layered configuration loading for service agents.
//!
//! Layers, lowest precedence first:
//!
//! 1. `T::default()`
//! 2. an optional YAML file
//! 3. environment variables starting with the agent prefix, `__` separating
//!    nested keys (`REDIS_AGENT__READINESS__ATTEMPTS=10`)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Configuration error for layered config loading
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file does not exist: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("invalid configuration: {source}")]
    Invalid {
        #[source]
        source: Box<figment::Error>,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(source: figment::Error) -> Self {
        ConfigError::Invalid {
            source: Box::new(source),
        }
    }
}

/// Build the layered [`Figment`] without extracting it.
///
/// # Errors
/// [`ConfigError::FileNotFound`] when `file` is given but missing.
pub fn layered<T: Serialize + Default>(
    file: Option<&Path>,
    env_prefix: &str,
) -> Result<Figment, ConfigError> {
    let mut figment = Figment::new().merge(Serialized::defaults(T::default()));

    if let Some(path) = file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Yaml::file(path));
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load `T` from defaults, an optional YAML file and the environment.
///
/// # Errors
/// [`ConfigError::FileNotFound`] for a missing file, [`ConfigError::Invalid`]
/// when a layer does not deserialize into `T`.
pub fn load_layered<T>(file: Option<&Path>, env_prefix: &str) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let config = layered::<T>(file, env_prefix)?.extract()?;
    Ok(config)
}
