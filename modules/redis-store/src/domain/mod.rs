pub mod builder;
pub mod deploy;
pub mod endpoints;
pub mod error;
pub mod exporter;
pub mod information;
pub mod repo;
pub mod requests;
pub mod runners;
pub mod runtime;
pub mod service;
pub mod settings;
pub mod topology;

/// Name under which connection strings are published as provider information.
pub const PROVIDER_NAME: &str = "redis";
