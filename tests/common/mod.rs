//! Shared pipeline fixture: real engine, cache, hosts view, client resolver,
//! query log, and stats, with the forwarder replaced by a scripted stub.

use aegis_dns_application::ports::{ForwarderPort, UpstreamAnswer};
use aegis_dns_domain::{
    config::{CacheConfig, QueryLogConfig, StatsConfig},
    AccessList, CoreError, PersistentClient, Proto, Question, QueryOrigin,
};
use aegis_dns_infrastructure::cache::ResponseCache;
use aegis_dns_infrastructure::clients::{ClientResolver, PolicyDefaults};
use aegis_dns_infrastructure::filter::{FilterEngine, RuleMatcher};
use aegis_dns_infrastructure::hosts::HostsView;
use aegis_dns_infrastructure::pipeline::{Pipeline, PipelineSettings, Sinkhole};
use aegis_dns_infrastructure::querylog::QueryLog;
use aegis_dns_infrastructure::stats::StatsTracker;
use aegis_dns_infrastructure::wire;
use async_trait::async_trait;
use bytes::Bytes;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted forwarder: answers every question with a fixed A record and
/// counts how often it was called. An optional delay keeps background
/// refreshes observable in-flight.
pub struct StubForwarder {
    pub answer_ip: std::net::Ipv4Addr,
    pub ttl: u32,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl StubForwarder {
    pub fn new(answer_ip: &str) -> Arc<Self> {
        Self::with_ttl_and_delay(answer_ip, 300, Duration::ZERO)
    }

    pub fn with_ttl_and_delay(answer_ip: &str, ttl: u32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer_ip: answer_ip.parse().unwrap(),
            ttl,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForwarderPort for StubForwarder {
    async fn forward(
        &self,
        query_bytes: &[u8],
        question: &Question,
        _upstream_override: Option<&[String]>,
        _deadline: tokio::time::Instant,
    ) -> Result<UpstreamAnswer, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let request = Message::from_vec(query_bytes)
            .map_err(|e| CoreError::WireFormat(e.to_string()))?;
        let mut response = wire::response_for(&request);
        response
            .set_message_type(MessageType::Response)
            .set_response_code(ResponseCode::NoError);
        let name = wire::fqdn(&question.name)?;
        response.add_answer(Record::from_rdata(
            name,
            self.ttl,
            RData::A(A(self.answer_ip)),
        ));

        Ok(UpstreamAnswer {
            bytes: Bytes::from(wire::encode(&response)?),
            upstream: Arc::from("stub://upstream"),
            elapsed: Duration::from_millis(1),
        })
    }

    async fn probe_all(&self) -> Vec<(Arc<str>, Result<Duration, CoreError>)> {
        vec![(Arc::from("stub://upstream"), Ok(Duration::from_millis(1)))]
    }
}

pub struct Fixture {
    pub pipeline: Pipeline,
    pub forwarder: Arc<StubForwarder>,
    pub querylog: Arc<QueryLog>,
    pub cache: Arc<ResponseCache>,
    pub hosts: Arc<HostsView>,
    _dir: tempfile::TempDir,
}

pub struct FixtureOptions {
    pub lists: Vec<(i64, String)>,
    pub user_rules: Vec<String>,
    pub clients: Vec<PersistentClient>,
    pub optimistic: bool,
    pub forwarder: Arc<StubForwarder>,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            lists: vec![],
            user_rules: vec![],
            clients: vec![],
            optimistic: false,
            forwarder: StubForwarder::new("93.184.216.34"),
        }
    }
}

pub fn build(options: FixtureOptions) -> Fixture {
    let dir = tempfile::tempdir().unwrap();

    let list_refs: Vec<(i64, &str)> = options
        .lists
        .iter()
        .map(|(id, content)| (*id, content.as_str()))
        .collect();
    let matcher = RuleMatcher::compile(&list_refs, &options.user_rules);
    let engine = Arc::new(FilterEngine::new(matcher, None, None));

    let hosts = Arc::new(HostsView::new("lan", vec!["192.168.0.0/16".parse().unwrap()]));
    let clients = Arc::new(ClientResolver::new(
        options.clients,
        PolicyDefaults {
            filtering: true,
            safesearch: false,
            safebrowsing: false,
            parental: false,
            blocked_services: Arc::from(Vec::new()),
        },
        Arc::clone(&hosts),
    ));

    let cache = Arc::new(ResponseCache::new(CacheConfig {
        optimistic: options.optimistic,
        ttl_floor_secs: 0,
        ..CacheConfig::default()
    }));
    let querylog = Arc::new(QueryLog::new(QueryLogConfig::default(), dir.path()));
    let stats = Arc::new(StatsTracker::new(StatsConfig::default(), vec![]));

    let settings = PipelineSettings {
        access: AccessList::default(),
        sinkhole: Sinkhole {
            v4: std::net::Ipv4Addr::UNSPECIFIED,
            v6: std::net::Ipv6Addr::UNSPECIFIED,
            safe: None,
        },
        request_budget: Duration::from_secs(5),
        protection_enabled: true,
        ddr_templates: vec![],
        ecs_enabled: false,
        ecs_prefix_v4: 24,
        ecs_prefix_v6: 56,
    };

    let pipeline = Pipeline::new(
        engine,
        clients,
        Arc::clone(&hosts),
        options.forwarder.clone(),
        Arc::clone(&cache),
        querylog.clone(),
        stats,
        settings,
    );

    Fixture {
        pipeline,
        forwarder: options.forwarder,
        querylog,
        cache,
        hosts,
        _dir: dir,
    }
}

pub fn origin(ip: &str) -> QueryOrigin {
    let addr: SocketAddr = format!("{ip}:50000").parse().unwrap();
    QueryOrigin::plain(addr, Proto::Udp)
}

/// Wire bytes for one question.
pub fn query_bytes(name: &str, qtype: aegis_dns_domain::RecordType) -> Vec<u8> {
    let question = Question::new(name, qtype);
    let message = wire::build_query(&question, false).unwrap();
    wire::encode(&message).unwrap()
}
