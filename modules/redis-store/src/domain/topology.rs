//! Resolution of the write/read endpoints against proposed mappings.

use agentkit::network::{self, NetworkError};
use agentkit::{NetworkInstance, NetworkMapping, NetworkScope};

use super::endpoints::RedisEndpoints;

/// The mappings this service runs on, write first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub write: NetworkMapping,
    pub read: NetworkMapping,
    /// Whether `read` was proposed separately or aliases `write`.
    pub replicated: bool,
}

impl Topology {
    /// Resolve write and read. Without a replica, read aliases write and
    /// no read mapping needs to be proposed.
    ///
    /// # Errors
    /// [`NetworkError::MappingNotFound`] for a missing required mapping.
    pub fn resolve(
        proposed: &[NetworkMapping],
        endpoints: &RedisEndpoints,
        read_replica: bool,
    ) -> Result<Self, NetworkError> {
        let write = network::resolve(proposed, &endpoints.write)?;
        let read = if read_replica {
            network::resolve(proposed, &endpoints.read)?
        } else {
            network::alias_to(&write, &endpoints.read)
        };
        Ok(Self {
            write,
            read,
            replicated: read_replica,
        })
    }

    #[must_use]
    pub fn mappings(&self) -> Vec<NetworkMapping> {
        vec![self.write.clone(), self.read.clone()]
    }

    /// Native instance of the write mapping, where the primary publishes its port.
    ///
    /// # Errors
    /// [`NetworkError::InstanceNotFound`] when no native instance was proposed.
    pub fn write_native(&self) -> Result<&NetworkInstance, NetworkError> {
        network::find_instance_for_scope(&self.write, NetworkScope::Native)
    }

    /// # Errors
    /// [`NetworkError::InstanceNotFound`] when no native instance was proposed.
    pub fn read_native(&self) -> Result<&NetworkInstance, NetworkError> {
        network::find_instance_for_scope(&self.read, NetworkScope::Native)
    }

    /// Address a replica container uses to reach the primary.
    ///
    /// The proposed container instance when there is one, otherwise the
    /// native instance seen through `docker_host_alias`.
    ///
    /// # Errors
    /// [`NetworkError::InstanceNotFound`] when neither scope was proposed.
    pub fn primary_for_containers(
        &self,
        docker_host_alias: &str,
    ) -> Result<NetworkInstance, NetworkError> {
        instance_for_scope(&self.write, NetworkScope::Container, docker_host_alias)
    }
}

/// Exact scope match, with a native fallback for the container scope.
///
/// # Errors
/// [`NetworkError::InstanceNotFound`] when the scope cannot be served.
pub fn instance_for_scope(
    mapping: &NetworkMapping,
    scope: NetworkScope,
    docker_host_alias: &str,
) -> Result<NetworkInstance, NetworkError> {
    match network::find_instance_for_scope(mapping, scope) {
        Ok(instance) => Ok(instance.clone()),
        Err(err) if scope == NetworkScope::Container => {
            network::find_instance_for_scope(mapping, NetworkScope::Native)
                .map(|native| native.localized(docker_host_alias))
                .map_err(|_| err)
        }
        Err(err) => Err(err),
    }
}
