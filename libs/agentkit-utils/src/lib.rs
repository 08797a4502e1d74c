#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Small shared helpers for AgentKit crates.

pub mod humantime_serde;
pub mod secret_string;

pub use secret_string::SecretString;
