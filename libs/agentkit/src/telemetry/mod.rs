//! Logging setup for service agents
//!
//! Agents log through `tracing`; this module installs the subscriber the
//! hosting process uses to print those events.

pub mod config;
pub mod init;

pub use config::{LogFormat, LoggingConfig};
pub use init::init_logging;
