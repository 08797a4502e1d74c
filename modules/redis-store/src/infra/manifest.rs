//! Bundled manifest renderer.
//!
//! Writes the parameter set as `<template>.parameters.json` into each
//! destination, for a kustomize generator or a templating step to consume.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;

use crate::domain::deploy::{DeploymentParameters, ManifestRenderer, ManifestTemplate};

#[derive(Debug, Clone, Default)]
pub struct JsonManifestRenderer;

impl JsonManifestRenderer {
    #[must_use]
    pub fn file_name(template: ManifestTemplate) -> String {
        format!("{}.parameters.json", template.as_str())
    }
}

#[async_trait]
impl ManifestRenderer for JsonManifestRenderer {
    async fn render(
        &self,
        template: ManifestTemplate,
        destination: &Path,
        parameters: &DeploymentParameters,
    ) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(destination)
            .await
            .with_context(|| format!("cannot create {}", destination.display()))?;

        let body = serde_json::to_vec_pretty(parameters).context("cannot encode parameters")?;
        let path = destination.join(Self::file_name(template));
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }
}
