//! Deployment manifests.
//!
//! The agent computes the parameters (image, replica count, read selector,
//! secret environment) and the destinations; rendering them into manifests
//! is the renderer's business.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use agentkit::{ImageRef, ProviderInformation, ServiceIdentity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeploymentTarget {
    Kustomize(KustomizeTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KustomizeTarget {
    /// Root of the kustomize tree.
    pub destination: PathBuf,
}

/// Which Service the read connection points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSelector {
    Read,
    Write,
}

impl ReadSelector {
    #[must_use]
    pub fn for_settings(settings: &Settings) -> Self {
        if settings.read_replica {
            ReadSelector::Read
        } else {
            ReadSelector::Write
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParameters {
    pub image: ImageRef,
    pub replica_count: u32,
    pub read_selector: ReadSelector,
    pub environment: String,
    pub namespace: String,
    /// `PROVIDER__...__WRITE` / `...__READ` to connection strings.
    pub secrets: BTreeMap<String, String>,
}

impl fmt::Display for ReadSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadSelector::Read => f.write_str("read"),
            ReadSelector::Write => f.write_str("write"),
        }
    }
}

/// Manifest sets shipped with the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestTemplate {
    Base,
    /// Per-environment overlay for the primary.
    EnvironmentOverlay,
    /// Added to the environment overlay when a replica is requested.
    ReplicasOverlay,
}

impl ManifestTemplate {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ManifestTemplate::Base => "base",
            ManifestTemplate::EnvironmentOverlay => "environment",
            ManifestTemplate::ReplicasOverlay => "replicas",
        }
    }
}

#[async_trait]
pub trait ManifestRenderer: Send + Sync {
    async fn render(
        &self,
        template: ManifestTemplate,
        destination: &Path,
        parameters: &DeploymentParameters,
    ) -> anyhow::Result<()>;
}

/// `<destination>/applications/<app>/services/<service>`
#[must_use]
pub fn service_root(target: &KustomizeTarget, identity: &ServiceIdentity) -> PathBuf {
    target
        .destination
        .join("applications")
        .join(&identity.application)
        .join("services")
        .join(&identity.name)
}

/// Templates to render and where, in order.
#[must_use]
pub fn kustomize_plan(
    target: &KustomizeTarget,
    identity: &ServiceIdentity,
    environment: &str,
    settings: &Settings,
) -> Vec<(ManifestTemplate, PathBuf)> {
    let root = service_root(target, identity);
    let overlay = root.join("overlays").join(environment);
    let mut plan = vec![
        (ManifestTemplate::Base, root.join("base")),
        (ManifestTemplate::EnvironmentOverlay, overlay.clone()),
    ];
    if settings.read_replica {
        plan.push((ManifestTemplate::ReplicasOverlay, overlay));
    }
    plan
}

/// Secret environment entries for the connection strings, keyed the way
/// consumers read provider information from their environment.
#[must_use]
pub fn secret_env(origin: &str, write: &str, read: &str) -> BTreeMap<String, String> {
    let info = ProviderInformation::new(super::PROVIDER_NAME, origin)
        .with("write", write)
        .with("read", read);
    info.as_env().into_iter().collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn target() -> KustomizeTarget {
        KustomizeTarget {
            destination: PathBuf::from("/deploy"),
        }
    }

    #[test]
    fn plan_without_replica_skips_replicas_overlay() {
        let id = ServiceIdentity::new("shop", "cache");
        let plan = kustomize_plan(&target(), &id, "prod", &Settings::default());

        assert_eq!(
            plan,
            vec![
                (
                    ManifestTemplate::Base,
                    PathBuf::from("/deploy/applications/shop/services/cache/base")
                ),
                (
                    ManifestTemplate::EnvironmentOverlay,
                    PathBuf::from("/deploy/applications/shop/services/cache/overlays/prod")
                ),
            ]
        );
    }

    #[test]
    fn plan_with_replica_adds_overlay() {
        let id = ServiceIdentity::new("shop", "cache");
        let settings = Settings {
            read_replica: true,
            ..Settings::default()
        };
        let plan = kustomize_plan(&target(), &id, "prod", &settings);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2].0, ManifestTemplate::ReplicasOverlay);
        assert_eq!(plan[2].1, plan[1].1);
    }

    #[test]
    fn read_selector_follows_replica_flag() {
        assert_eq!(
            ReadSelector::for_settings(&Settings::default()),
            ReadSelector::Write
        );
        let settings = Settings {
            read_replica: true,
            ..Settings::default()
        };
        assert_eq!(ReadSelector::for_settings(&settings).to_string(), "read");
    }

    #[test]
    fn secrets_use_provider_env_keys() {
        let secrets = secret_env("shop/cache", "redis://w:1", "redis://r:2");
        assert_eq!(
            secrets.get("PROVIDER__SHOP_CACHE__REDIS__WRITE").map(String::as_str),
            Some("redis://w:1")
        );
        assert_eq!(
            secrets.get("PROVIDER__SHOP_CACHE__REDIS__READ").map(String::as_str),
            Some("redis://r:2")
        );
    }

    #[test]
    fn target_is_tagged() {
        let target: DeploymentTarget = serde_json::from_value(serde_json::json!({
            "kind": "kustomize",
            "destination": "/deploy"
        }))
        .unwrap();
        assert_eq!(target, DeploymentTarget::Kustomize(self::target()));
    }
}
