use super::bootstrap::Bootstrap;
use super::domains::{self, DomainRoute, DomainTable};
use super::strategy::{self, ExchangeOutcome};
use super::upstream::Upstream;
use super::url;
use aegis_dns_application::ports::{ForwarderPort, UpstreamAnswer};
use aegis_dns_domain::{
    config::UpstreamConfig, CoreError, Question, RecordType, UpstreamMode,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use hickory_proto::op::Message;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The upstream forwarder: default pool, domain-qualified routing, bootstrap
/// resolution, and the configured selection strategy.
pub struct Forwarder {
    mode: UpstreamMode,
    timeout: Duration,
    probe_window: Duration,
    defaults: Vec<Arc<Upstream>>,
    domain_table: DomainTable,
    bootstrap: Arc<Bootstrap>,
    /// Per-client override endpoints, parsed once and reused.
    adhoc: DashMap<String, Arc<Upstream>, FxBuildHasher>,
}

impl Forwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, CoreError> {
        let (defaults, domain_table) = domains::build_tables(&config.upstreams)?;
        let bootstrap = Arc::new(Bootstrap::new(&config.bootstrap)?);

        Ok(Self {
            mode: config.mode,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            probe_window: Duration::from_millis(config.probe_window_ms.max(1)),
            defaults,
            domain_table,
            bootstrap,
            adhoc: DashMap::with_hasher(FxBuildHasher),
        })
    }

    /// The upstream set for one request: per-client override, then the
    /// domain table, then the defaults.
    fn select(
        &self,
        question: &Question,
        upstream_override: Option<&[String]>,
    ) -> Result<Vec<Arc<Upstream>>, CoreError> {
        if let Some(endpoints) = upstream_override {
            if !endpoints.is_empty() {
                let mut set = Vec::with_capacity(endpoints.len());
                for endpoint in endpoints {
                    let upstream = match self.adhoc.get(endpoint) {
                        Some(existing) => Arc::clone(&existing),
                        None => {
                            let parsed = Arc::new(Upstream::new(url::parse(endpoint)?));
                            self.adhoc.insert(endpoint.clone(), Arc::clone(&parsed));
                            parsed
                        }
                    };
                    set.push(upstream);
                }
                return Ok(set);
            }
        }

        match self.domain_table.select(&question.name) {
            Some(DomainRoute::Upstreams(set)) => Ok(set.clone()),
            Some(DomainRoute::Default) | None => Ok(self.defaults.clone()),
        }
    }

    async fn run_strategy(
        &self,
        set: &[Arc<Upstream>],
        query: &[u8],
        timeout: Duration,
    ) -> Result<ExchangeOutcome, CoreError> {
        match self.mode {
            UpstreamMode::LoadBalance => {
                strategy::load_balance(set, query, timeout, &self.bootstrap).await
            }
            UpstreamMode::ParallelAll => {
                strategy::parallel_all(set, query, timeout, &self.bootstrap).await
            }
            UpstreamMode::FastestIp => {
                strategy::fastest_ip(set, query, timeout, self.probe_window, &self.bootstrap)
                    .await
            }
        }
    }

    /// Strip malformed client-subnet options some upstreams echo back.
    /// Returns the original bytes untouched when nothing needs fixing.
    fn normalize_response(bytes: Vec<u8>) -> Vec<u8> {
        let Ok(mut message) = Message::from_vec(&bytes) else {
            return bytes;
        };
        let before = crate::wire::client_subnet_of(&message);
        crate::wire::normalize_client_subnet(&mut message);
        if crate::wire::client_subnet_of(&message) == before {
            return bytes;
        }
        message.to_vec().unwrap_or(bytes)
    }
}

#[async_trait]
impl ForwarderPort for Forwarder {
    async fn forward(
        &self,
        query_bytes: &[u8],
        question: &Question,
        upstream_override: Option<&[String]>,
        deadline: Instant,
    ) -> Result<UpstreamAnswer, CoreError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CoreError::QueryTimeout);
        }
        let timeout = remaining.min(self.timeout);

        let set = self.select(question, upstream_override)?;
        if set.is_empty() {
            return Err(CoreError::UpstreamFailed("empty upstream set".into()));
        }

        debug!(
            question = %question,
            upstreams = set.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Forwarding query"
        );

        let outcome = self.run_strategy(&set, query_bytes, timeout).await.map_err(|e| {
            warn!(question = %question, error = %e, "All upstreams failed");
            e
        })?;

        Ok(UpstreamAnswer {
            bytes: Bytes::from(Self::normalize_response(outcome.bytes)),
            upstream: outcome.upstream,
            elapsed: outcome.elapsed,
        })
    }

    /// Parallel health probe: one A query per configured upstream.
    async fn probe_all(&self) -> Vec<(Arc<str>, Result<Duration, CoreError>)> {
        let question = Question::new("ipv4only.arpa", RecordType::A);
        let query = match crate::wire::build_query(&question, false)
            .and_then(|m| crate::wire::encode(&m))
        {
            Ok(bytes) => bytes,
            Err(e) => {
                return self
                    .defaults
                    .iter()
                    .map(|u| (u.display(), Err(CoreError::Internal(e.to_string()))))
                    .collect()
            }
        };

        let probes = self.defaults.iter().map(|upstream| {
            let query = query.clone();
            let bootstrap = Arc::clone(&self.bootstrap);
            async move {
                let started = std::time::Instant::now();
                let result = upstream
                    .exchange(&query, self.timeout, &bootstrap)
                    .await
                    .map(|_| started.elapsed());
                (upstream.display(), result)
            }
        });

        futures::future::join_all(probes).await
    }
}
