#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Redis service agent.
//!
//! Provisions a Redis store for an application: a write instance and, when
//! requested, a read replica following it. The [`Builder`] half persists the
//! service settings, publishes connection strings and renders deployment
//! parameters; the [`Runtime`] half runs the servers locally in containers.

pub mod config;
pub mod domain;
pub mod infra;
pub mod module;

pub use config::RedisAgentConfig;
pub use domain::builder::Builder;
pub use domain::error::AgentError;
pub use domain::runtime::Runtime;
pub use domain::settings::{Settings, SettingsPatch};
pub use module::RedisAgent;
