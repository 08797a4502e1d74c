//! Network model shared by every service agent.
//!
//! The orchestration platform proposes one [`NetworkMapping`] per declared
//! [`Endpoint`]; each mapping carries one [`NetworkInstance`] per
//! [`NetworkScope`] the caller needs. Agents never allocate addresses
//! themselves, they only pick from what was proposed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::ServiceIdentity;

/// Wire protocol exposed by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    Tcp,
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKind::Tcp => f.write_str("tcp"),
        }
    }
}

/// A logical, named network surface of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub application: String,
    pub service: String,
    pub name: String,
    pub api: ApiKind,
}

impl Endpoint {
    #[must_use]
    pub fn tcp(identity: &ServiceIdentity, name: impl Into<String>) -> Self {
        Self {
            application: identity.application.clone(),
            service: identity.name.clone(),
            name: name.into(),
            api: ApiKind::Tcp,
        }
    }

    /// Identity match: application, service and endpoint name.
    #[must_use]
    pub fn same_identity(&self, other: &Endpoint) -> bool {
        self.application == other.application
            && self.service == other.service
            && self.name == other.name
    }

    /// `application/service/name`
    #[must_use]
    pub fn unique(&self) -> String {
        format!("{}/{}/{}", self.application, self.service, self.name)
    }
}

/// Where an address is reachable from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkScope {
    /// Reachable from a process running directly on the host.
    Native,
    /// Reachable from inside the container network.
    Container,
}

impl fmt::Display for NetworkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkScope::Native => f.write_str("native"),
            NetworkScope::Container => f.write_str("container"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkInstance {
    pub hostname: String,
    pub port: u16,
    pub scope: NetworkScope,
}

impl NetworkInstance {
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: u16, scope: NetworkScope) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            scope,
        }
    }

    /// `hostname:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Same port, different host, container scope.
    ///
    /// Used when a container has to reach a port published on the host and
    /// the caller only proposed native instances.
    #[must_use]
    pub fn localized(&self, hostname: &str) -> Self {
        Self {
            hostname: hostname.to_owned(),
            port: self.port,
            scope: NetworkScope::Container,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMapping {
    pub endpoint: Endpoint,
    pub instances: Vec<NetworkInstance>,
}

impl NetworkMapping {
    #[must_use]
    pub fn new(endpoint: Endpoint, instances: Vec<NetworkInstance>) -> Self {
        Self {
            endpoint,
            instances,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("no network mapping proposed for endpoint '{endpoint}'")]
    MappingNotFound { endpoint: String },
    #[error("no {scope} network instance for endpoint '{endpoint}'")]
    InstanceNotFound {
        endpoint: String,
        scope: NetworkScope,
    },
}

/// Find the proposed mapping for `endpoint` (identity match, first wins).
///
/// # Errors
/// Returns [`NetworkError::MappingNotFound`] when the caller did not propose
/// a mapping for the endpoint.
pub fn resolve(
    proposed: &[NetworkMapping],
    endpoint: &Endpoint,
) -> Result<NetworkMapping, NetworkError> {
    proposed
        .iter()
        .find(|m| m.endpoint.same_identity(endpoint))
        .cloned()
        .ok_or_else(|| NetworkError::MappingNotFound {
            endpoint: endpoint.unique(),
        })
}

/// Build a mapping for `endpoint` that reuses the instances of `target`.
///
/// No new address is allocated: whoever connects to `endpoint` reaches the
/// process listening behind `target`.
#[must_use]
pub fn alias_to(target: &NetworkMapping, endpoint: &Endpoint) -> NetworkMapping {
    NetworkMapping {
        endpoint: endpoint.clone(),
        instances: target.instances.clone(),
    }
}

/// Exact-match lookup of the instance proposed for `scope`.
///
/// # Errors
/// Returns [`NetworkError::InstanceNotFound`] when no instance carries that scope.
pub fn find_instance_for_scope(
    mapping: &NetworkMapping,
    scope: NetworkScope,
) -> Result<&NetworkInstance, NetworkError> {
    mapping
        .instances
        .iter()
        .find(|i| i.scope == scope)
        .ok_or_else(|| NetworkError::InstanceNotFound {
            endpoint: mapping.endpoint.unique(),
            scope,
        })
}

/// One-line summary for debug logs: `app/svc/write=[native:localhost:7000]`.
#[must_use]
pub fn summary(mappings: &[NetworkMapping]) -> String {
    mappings
        .iter()
        .map(|m| {
            let instances: Vec<String> = m
                .instances
                .iter()
                .map(|i| format!("{}:{}", i.scope, i.address()))
                .collect();
            format!("{}=[{}]", m.endpoint.unique(), instances.join(","))
        })
        .collect::<Vec<_>>()
        .join(" ")
}
