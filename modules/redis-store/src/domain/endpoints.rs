//! The two logical endpoints every Redis service declares.

use agentkit::{Endpoint, ServiceIdentity};

pub const WRITE: &str = "write";
pub const READ: &str = "read";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisEndpoints {
    pub write: Endpoint,
    pub read: Endpoint,
}

impl RedisEndpoints {
    /// Deterministic: the same identity always yields the same endpoints.
    #[must_use]
    pub fn declare(identity: &ServiceIdentity) -> Self {
        Self {
            write: Endpoint::tcp(identity, WRITE),
            read: Endpoint::tcp(identity, READ),
        }
    }

    #[must_use]
    pub fn all(&self) -> Vec<Endpoint> {
        vec![self.write.clone(), self.read.clone()]
    }
}
