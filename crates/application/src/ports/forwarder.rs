use aegis_dns_domain::{CoreError, Question};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A successful upstream exchange: the full wire-format response message and
/// where it came from.
#[derive(Debug, Clone)]
pub struct UpstreamAnswer {
    pub bytes: Bytes,
    pub upstream: Arc<str>,
    pub elapsed: Duration,
}

/// The upstream forwarder: endpoint pool, selection strategy, bootstrap
/// resolution, retries.
#[async_trait]
pub trait ForwarderPort: Send + Sync {
    /// Forward `query_bytes` (a complete wire message) for `question`.
    ///
    /// `upstream_override` replaces the configured default set when a client
    /// policy carries its own upstreams. The call must finish by `deadline`.
    async fn forward(
        &self,
        query_bytes: &[u8],
        question: &Question,
        upstream_override: Option<&[String]>,
        deadline: Instant,
    ) -> Result<UpstreamAnswer, CoreError>;

    /// Health-probe every configured upstream in parallel.
    async fn probe_all(&self) -> Vec<(Arc<str>, Result<Duration, CoreError>)>;
}
