//! Connection configuration exported per scope after `Init`.

use agentkit::configuration::partition_by_scope;
use agentkit::network::NetworkError;
use agentkit::{
    ConfigurationRecord, ConfigurationValue, Endpoint, ExportedConfiguration, NetworkInstance,
    NetworkScope, ScopedRecord,
};

use super::topology::{Topology, instance_for_scope};

pub const CONNECTION_KEY: &str = "connection";

/// Key, in the provider information of this service, holding the password.
pub const PASSWORD_KEY: &str = "REDIS_PASSWORD";

/// `redis://host:port`, or `redis://:password@host:port` when a password is set.
#[must_use]
pub fn connection_string(instance: &NetworkInstance, password: Option<&str>) -> String {
    match password {
        Some(password) if !password.is_empty() => {
            format!("redis://:{password}@{}", instance.address())
        }
        _ => format!("redis://{}", instance.address()),
    }
}

#[must_use]
pub fn export_for(
    endpoint: &Endpoint,
    instance: &NetworkInstance,
    password: Option<&str>,
) -> ScopedRecord {
    ScopedRecord {
        scope: instance.scope,
        record: ConfigurationRecord::new(
            endpoint.name.clone(),
            vec![ConfigurationValue::secret(
                CONNECTION_KEY,
                connection_string(instance, password),
            )],
        ),
    }
}

/// Records for write and read, in both native and container scope.
///
/// # Errors
/// [`NetworkError::InstanceNotFound`] when a mapping has no native instance.
pub fn export_topology(
    topology: &Topology,
    password: Option<&str>,
    docker_host_alias: &str,
) -> Result<ExportedConfiguration, NetworkError> {
    let mut records = Vec::with_capacity(4);
    for scope in [NetworkScope::Native, NetworkScope::Container] {
        for mapping in [&topology.write, &topology.read] {
            let instance = instance_for_scope(mapping, scope, docker_host_alias)?;
            records.push(export_for(&mapping.endpoint, &instance, password));
        }
    }
    Ok(partition_by_scope(records))
}
