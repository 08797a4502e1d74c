//! Domain error types for the Redis service agent.

use agentkit::lifecycle::{LifecycleError, Phase};
use agentkit::{AggregateStopError, NetworkError, SupervisorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    /// A phase was called out of order.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A required mapping or instance was not proposed.
    #[error("{phase}: {source}")]
    Network {
        phase: Phase,
        #[source]
        source: NetworkError,
    },

    #[error("{phase}: {source}")]
    Supervisor {
        phase: Phase,
        #[source]
        source: SupervisorError,
    },

    /// Teardown failed for one or more runners; every runner was attempted.
    #[error("{phase}: {source}")]
    Teardown {
        phase: Phase,
        #[source]
        source: AggregateStopError,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("cannot {operation} settings: {reason}")]
    Persistence {
        operation: &'static str,
        reason: String,
    },

    #[error("cannot render {template} manifests: {reason}")]
    Render { template: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    pub(crate) fn network(phase: Phase, source: NetworkError) -> Self {
        Self::Network { phase, source }
    }

    pub(crate) fn supervisor(phase: Phase, source: SupervisorError) -> Self {
        Self::Supervisor { phase, source }
    }

    pub(crate) fn persistence(operation: &'static str, err: &anyhow::Error) -> Self {
        Self::Persistence {
            operation,
            reason: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_name_the_phase() {
        let err = AgentError::network(
            Phase::Init,
            NetworkError::MappingNotFound {
                endpoint: "shop/cache/write".to_owned(),
            },
        );
        assert_eq!(
            err.to_string(),
            "init: no network mapping proposed for endpoint 'shop/cache/write'"
        );
    }

    #[test]
    fn readiness_timeout_reports_attempts() {
        let err = AgentError::supervisor(
            Phase::Start,
            SupervisorError::ReadinessTimeout {
                runner: "shop/cache".to_owned(),
                target: "localhost:7000".to_owned(),
                attempts: 5,
                last_error: "connection refused".to_owned(),
            },
        );
        assert!(err.to_string().contains("after 5 attempt(s)"));
    }
}
