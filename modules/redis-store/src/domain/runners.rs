//! Runner definitions derived from a resolved topology.
//!
//! The primary publishes the container port on the write mapping's native
//! port. The replica publishes on the read mapping's native port and follows
//! the primary at the address containers use to reach it.

use std::collections::BTreeMap;

use agentkit::network::NetworkError;
use agentkit::{
    ImageRef, OutputSink, PortMapping, ReadinessTarget, RunnerDefinition, ServiceIdentity,
    VolumeMount,
};

use super::settings::Settings;
use super::topology::Topology;

pub const SERVER_COMMAND: &str = "redis-server";
pub const DATA_DIR: &str = "/data";

/// Everything the plan depends on besides the topology.
#[derive(Debug, Clone)]
pub struct RunnerPlan<'a> {
    pub identity: &'a ServiceIdentity,
    pub settings: &'a Settings,
    pub image: ImageRef,
    pub container_port: u16,
    pub docker_host_alias: &'a str,
    pub env: BTreeMap<String, String>,
}

/// Identity a replica's output is forwarded under.
#[must_use]
pub fn replica_identity(identity: &ServiceIdentity) -> ServiceIdentity {
    identity.renamed(format!("{}-read", identity.name))
}

impl RunnerPlan<'_> {
    /// Primary first, then the replica when one is requested.
    ///
    /// # Errors
    /// [`NetworkError::InstanceNotFound`] when a mapping lacks the instance a
    /// runner needs.
    pub fn definitions(&self, topology: &Topology) -> Result<Vec<RunnerDefinition>, NetworkError> {
        let mut definitions = vec![self.primary(topology)?];
        if self.settings.read_replica {
            definitions.push(self.replica(topology)?);
        }
        Ok(definitions)
    }

    fn primary(&self, topology: &Topology) -> Result<RunnerDefinition, NetworkError> {
        let native = topology.write_native()?;
        let command = self.command(Vec::new());
        Ok(self.definition(self.identity, "write", native.port, &native.hostname, command))
    }

    fn replica(&self, topology: &Topology) -> Result<RunnerDefinition, NetworkError> {
        let native = topology.read_native()?;
        let primary = topology.primary_for_containers(self.docker_host_alias)?;
        let command = self.command(vec![
            "--replicaof".to_owned(),
            primary.hostname.clone(),
            primary.port.to_string(),
        ]);
        Ok(self.definition(
            &replica_identity(self.identity),
            "read",
            native.port,
            &native.hostname,
            command,
        ))
    }

    fn command(&self, extra: Vec<String>) -> Vec<String> {
        let mut command = vec![SERVER_COMMAND.to_owned()];
        command.extend(extra);
        if self.settings.persist {
            command.extend(["--appendonly".to_owned(), "yes".to_owned()]);
        }
        command
    }

    fn definition(
        &self,
        identity: &ServiceIdentity,
        role: &str,
        host_port: u16,
        host: &str,
        command: Vec<String>,
    ) -> RunnerDefinition {
        let name = identity.unique();
        let mut definition = RunnerDefinition::new(name.clone(), self.image.clone())
            .with_command(command)
            .with_port(PortMapping {
                container: self.container_port,
                host: host_port,
            })
            .with_env(self.env.clone())
            .with_readiness(ReadinessTarget {
                hostname: host.to_owned(),
                port: host_port,
            });

        definition = if self.settings.silent {
            definition.with_silence()
        } else {
            definition.with_output(OutputSink::Forward { label: name })
        };

        if self.settings.persist {
            definition = definition.with_volume(VolumeMount {
                name: volume_name(self.identity, role),
                target: DATA_DIR.to_owned(),
            });
        }
        definition
    }
}

/// `<application>-<service>-<role>-data`, restricted to volume-safe characters.
fn volume_name(identity: &ServiceIdentity, role: &str) -> String {
    format!("{}-{}-{role}-data", identity.application, identity.name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::endpoints::RedisEndpoints;
    use agentkit::{NetworkInstance, NetworkMapping, NetworkScope};

    fn identity() -> ServiceIdentity {
        ServiceIdentity::new("shop", "cache")
    }

    fn topology(read_replica: bool) -> Topology {
        let eps = RedisEndpoints::declare(&identity());
        let proposed = vec![
            NetworkMapping::new(
                eps.write.clone(),
                vec![NetworkInstance::new("localhost", 7000, NetworkScope::Native)],
            ),
            NetworkMapping::new(
                eps.read.clone(),
                vec![NetworkInstance::new("localhost", 7001, NetworkScope::Native)],
            ),
        ];
        Topology::resolve(&proposed, &eps, read_replica).unwrap()
    }

    fn plan<'a>(identity: &'a ServiceIdentity, settings: &'a Settings) -> RunnerPlan<'a> {
        RunnerPlan {
            identity,
            settings,
            image: ImageRef::new("redis", "latest"),
            container_port: 6379,
            docker_host_alias: "host.docker.internal",
            env: BTreeMap::from([("PROVIDER__X__Y__Z".to_owned(), "v".to_owned())]),
        }
    }

    #[test]
    fn single_primary_without_replica() {
        let id = identity();
        let settings = Settings::default();
        let defs = plan(&id, &settings).definitions(&topology(false)).unwrap();

        assert_eq!(defs.len(), 1);
        let primary = &defs[0];
        assert_eq!(primary.name, "shop/cache");
        assert_eq!(primary.command, ["redis-server"]);
        assert_eq!(
            primary.ports,
            [PortMapping {
                container: 6379,
                host: 7000
            }]
        );
        assert_eq!(primary.env.get("PROVIDER__X__Y__Z").map(String::as_str), Some("v"));
        assert!(primary.volume.is_none());
    }

    #[test]
    fn replica_follows_primary_address() {
        let id = identity();
        let settings = Settings {
            read_replica: true,
            ..Settings::default()
        };
        let defs = plan(&id, &settings).definitions(&topology(true)).unwrap();

        assert_eq!(defs.len(), 2);
        let replica = &defs[1];
        assert_eq!(replica.name, "shop/cache-read");
        assert_eq!(
            replica.command,
            ["redis-server", "--replicaof", "host.docker.internal", "7000"]
        );
        assert_eq!(replica.ports[0].host, 7001);
        assert_eq!(
            replica.output,
            OutputSink::Forward {
                label: "shop/cache-read".to_owned()
            }
        );
        assert_eq!(replica.readiness.as_ref().unwrap().port, 7001);
    }

    #[test]
    fn persistence_adds_volume_and_append_only() {
        let id = identity();
        let settings = Settings {
            read_replica: true,
            persist: true,
            silent: true,
            ..Settings::default()
        };
        let defs = plan(&id, &settings).definitions(&topology(true)).unwrap();

        assert_eq!(defs[0].command, ["redis-server", "--appendonly", "yes"]);
        assert_eq!(defs[0].volume.as_ref().unwrap().name, "shop-cache-write-data");
        assert_eq!(defs[1].volume.as_ref().unwrap().name, "shop-cache-read-data");
        assert_eq!(defs[1].volume.as_ref().unwrap().target, "/data");
        assert!(defs.iter().all(|d| d.output == OutputSink::Silent));
    }

    #[test]
    fn volume_names_are_sanitized() {
        let id = ServiceIdentity::new("My Shop", "cache");
        assert_eq!(volume_name(&id, "write"), "my-shop-cache-write-data");
    }
}
