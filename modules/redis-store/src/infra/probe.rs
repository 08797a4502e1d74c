use std::time::Duration;

use agentkit::{ReadinessProbe, ReadinessTarget};
use async_trait::async_trait;

use super::resp::RespConnection;

/// Ready once the server answers `PING`.
#[derive(Debug, Clone)]
pub struct RedisPingProbe {
    timeout: Duration,
}

impl RedisPingProbe {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ReadinessProbe for RedisPingProbe {
    async fn probe(&self, target: &ReadinessTarget) -> anyhow::Result<()> {
        let mut conn = RespConnection::connect(&target.hostname, target.port, self.timeout).await?;
        tokio::time::timeout(self.timeout, conn.ping())
            .await
            .map_err(|_| anyhow::anyhow!("PING to {target} timed out"))?
    }
}
