#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! AgentKit: building blocks for service agents.
//!
//! A service agent provisions and operates one service on behalf of an
//! orchestration platform. The platform drives it through lifecycle phases
//! (load, init, start, stop, destroy...); this crate provides the pieces
//! every agent needs to implement them:
//!
//! - [`network`]: endpoints, proposed mappings and their resolution
//! - [`configuration`]: scoped connection configuration exported after init
//! - [`supervisor`]: ordered start and aggregated teardown of runners
//! - [`backends`]: container runtimes (docker CLI, in-memory mock)
//! - [`lifecycle`]: the phase state machine
//! - [`context`]: the explicit per-call context (span, cancellation, status)
//! - [`config`] and [`telemetry`]: layered configuration and logging setup

pub mod backends;
pub mod config;
pub mod configuration;
pub mod context;
pub mod identity;
pub mod lifecycle;
pub mod network;
pub mod provider;
pub mod supervisor;
pub mod telemetry;

pub use backends::{
    BackendKind, ContainerRuntime, DockerCliBackend, DockerOptions, ImageRef, InstanceHandle,
    OutputSink, PortMapping, ReadinessTarget, RunnerDefinition, VolumeMount,
};
pub use configuration::{
    ConfigurationRecord, ConfigurationValue, ExportedConfiguration, ScopedRecord,
};
pub use context::{CallCtx, StatusSink, TracingStatusSink};
pub use identity::ServiceIdentity;
pub use lifecycle::{CreationState, Lifecycle, LifecycleError, LifecycleState, Phase};
pub use network::{Endpoint, NetworkError, NetworkInstance, NetworkMapping, NetworkScope};
pub use provider::ProviderInformation;
pub use supervisor::{
    AggregateStopError, ReadinessPolicy, ReadinessProbe, Runner, RunnerState, StopFailure,
    Supervisor, SupervisorError,
};
