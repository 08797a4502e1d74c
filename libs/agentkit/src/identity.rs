use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Who a service agent is acting for.
///
/// Handed over by the platform on `Load`; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub name: String,
    pub application: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub version: String,
    /// Directory holding the service definition and persisted settings.
    #[serde(default)]
    pub location: PathBuf,
}

impl ServiceIdentity {
    #[must_use]
    pub fn new(application: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            application: application.into(),
            workspace: String::new(),
            version: String::new(),
            location: PathBuf::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = location.into();
        self
    }

    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// `application/name`, the origin used in provider information.
    #[must_use]
    pub fn unique(&self) -> String {
        format!("{}/{}", self.application, self.name)
    }

    /// Copy of this identity under another service name (e.g. `cache-read`).
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}
