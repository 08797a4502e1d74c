//! Agent description and runtime status.

use agentkit::lifecycle::{CreationState, LifecycleState};
use agentkit::{RunnerState, ServiceIdentity};
use serde::{Deserialize, Serialize};

use super::PROVIDER_NAME;
use super::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeRequirement {
    Docker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Builder,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfoField {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfoDetail {
    pub name: String,
    pub description: String,
    pub fields: Vec<ProviderInfoField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInformation {
    pub runtime_requirements: Vec<RuntimeRequirement>,
    pub capabilities: Vec<Capability>,
    pub provider_infos: Vec<ProviderInfoDetail>,
    pub readme: String,
}

fn field(name: &str, description: &str) -> ProviderInfoField {
    ProviderInfoField {
        name: name.to_owned(),
        description: description.to_owned(),
    }
}

#[must_use]
pub fn agent_information() -> AgentInformation {
    AgentInformation {
        runtime_requirements: vec![RuntimeRequirement::Docker],
        capabilities: vec![Capability::Builder, Capability::Runtime],
        provider_infos: vec![ProviderInfoDetail {
            name: PROVIDER_NAME.to_owned(),
            description: "connection string".to_owned(),
            fields: vec![
                field("write", "connection string for write endpoint"),
                field("read", "connection string for read endpoint"),
            ],
        }],
        readme: README.to_owned(),
    }
}

const README: &str = "\
# Redis

Runs a Redis primary and, optionally, one read replica.

## Endpoints

- `write`: the primary
- `read`: the replica, or the primary when no replica is configured

## Settings

- `read-replica`: run a replica following the primary
- `persist`: keep data in a named volume; stop leaves the servers running
- `silent`: do not forward server output
";

/// Text shown after `Load`.
#[must_use]
pub fn getting_started(identity: &ServiceIdentity, settings: &Settings) -> String {
    let origin = identity.unique();
    let topology = if settings.read_replica {
        "a primary and a read replica"
    } else {
        "a single primary (reads go to the primary)"
    };
    format!(
        "# Getting started with {origin}\n\n\
         This service runs {topology}.\n\n\
         Dependent services receive the connection strings as provider \
         information `{PROVIDER_NAME}` from `{origin}` with the keys `write` and `read`.\n"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStatus {
    pub name: String,
    pub state: RunnerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub state: LifecycleState,
    pub creation: CreationState,
    pub runners: Vec<RunnerStatus>,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn information_lists_provider_fields() {
        let info = agent_information();
        assert_eq!(info.runtime_requirements, [RuntimeRequirement::Docker]);
        assert_eq!(info.capabilities, [Capability::Builder, Capability::Runtime]);
        let fields: Vec<&str> = info.provider_infos[0]
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(fields, ["write", "read"]);
        assert!(info.readme.starts_with("# Redis"));
    }

    #[test]
    fn getting_started_mentions_topology() {
        let id = ServiceIdentity::new("shop", "cache");
        let text = getting_started(
            &id,
            &Settings {
                read_replica: true,
                ..Settings::default()
            },
        );
        assert!(text.contains("shop/cache"));
        assert!(text.contains("read replica"));
    }
}
