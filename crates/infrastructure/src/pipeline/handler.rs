use super::ddr;
use super::synth::{self, Sinkhole};
use crate::cache::{CacheLookup, ResponseCache};
use crate::wire;
use aegis_dns_application::ports::{
    ClientResolverPort, FilterEnginePort, ForwarderPort, HostsViewPort, QueryLogPort, StatsPort,
};
use aegis_dns_domain::{
    AccessList, BlockReason, ClientPolicy, Decision, Question, QueryLogRecord, QueryOrigin,
    RCode, RecordType, RequestFingerprint, ResultReason, RuleRef,
};
use chrono::Utc;
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Static knobs the pipeline reads per request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub access: AccessList,
    pub sinkhole: Sinkhole,
    /// Total per-request budget; downstream calls inherit the remainder.
    pub request_budget: Duration,
    /// Master protection switch. Off keeps rewrites and local answers only.
    pub protection_enabled: bool,
    pub ddr_templates: Vec<String>,
    pub ecs_enabled: bool,
    pub ecs_prefix_v4: u8,
    pub ecs_prefix_v6: u8,
}

/// The per-request state machine: parse → access → client → pre-filter →
/// local answer → cache → forward → post-filter → cache put → log.
pub struct Pipeline {
    engine: Arc<dyn FilterEnginePort>,
    clients: Arc<dyn ClientResolverPort>,
    hosts: Arc<dyn HostsViewPort>,
    forwarder: Arc<dyn ForwarderPort>,
    cache: Arc<ResponseCache>,
    querylog: Arc<dyn QueryLogPort>,
    stats: Arc<dyn StatsPort>,
    settings: PipelineSettings,
}

/// What one request resolved to, before logging.
struct Reply {
    bytes: Vec<u8>,
    result: ResultReason,
    rcode: RCode,
    rules: Vec<RuleRef>,
    upstream: Option<String>,
    upstream_us: Option<u64>,
    cached: bool,
}

impl Reply {
    fn synth(message: &Message, result: ResultReason, rules: Vec<RuleRef>) -> Option<Self> {
        let bytes = wire::encode(message).ok()?;
        Some(Self {
            rcode: RCode::from_u8(u8::from(message.response_code().low())),
            bytes,
            result,
            rules,
            upstream: None,
            upstream_us: None,
            cached: false,
        })
    }
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<dyn FilterEnginePort>,
        clients: Arc<dyn ClientResolverPort>,
        hosts: Arc<dyn HostsViewPort>,
        forwarder: Arc<dyn ForwarderPort>,
        cache: Arc<ResponseCache>,
        querylog: Arc<dyn QueryLogPort>,
        stats: Arc<dyn StatsPort>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            engine,
            clients,
            hosts,
            forwarder,
            cache,
            querylog,
            stats,
            settings,
        }
    }

    /// Handle one wire-format request. `None` means drop without answering
    /// (access denial on an encrypted transport).
    pub async fn handle(&self, packet: &[u8], origin: &QueryOrigin) -> Option<Vec<u8>> {
        let started_wall = Utc::now();
        let started = Instant::now();
        let deadline = started + self.settings.request_budget;

        // 1. Received: parse header + question.
        let (request, question) = match wire::parse_request(packet) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Malformed query");
                let id = if packet.len() >= 2 {
                    u16::from_be_bytes([packet[0], packet[1]])
                } else {
                    0
                };
                let response = wire::formerr_bare(id);
                let bytes = wire::encode(&response).ok()?;
                self.log(
                    started_wall,
                    started,
                    &Question::new("", RecordType::Unknown(0)),
                    origin,
                    None,
                    Reply {
                        bytes: bytes.clone(),
                        result: ResultReason::ErrorFormat,
                        rcode: RCode::FormErr,
                        rules: vec![],
                        upstream: None,
                        upstream_us: None,
                        cached: false,
                    },
                );
                return Some(bytes);
            }
        };

        // 2. AccessCheck.
        let client_id = self.clients.extract_client_id(origin);
        if !self
            .settings
            .access
            .permits(origin.ip(), client_id.as_deref())
        {
            warn!(client = %origin.addr, "Query refused by access list");
            let reply = Reply::synth(
                &wire::refused_for(&request),
                ResultReason::ErrorRefusedAccess,
                vec![],
            )?;
            let bytes = reply.bytes.clone();
            self.log(started_wall, started, &question, origin, None, reply);
            // Encrypted transports drop instead of answering.
            if origin.proto.is_encrypted() {
                return None;
            }
            return Some(bytes);
        }

        // 3. ClientResolved.
        let mut policy = self.clients.resolve(origin);
        if !self.settings.protection_enabled {
            policy.filtering = false;
            policy.safesearch = false;
            policy.safebrowsing = false;
            policy.parental = false;
        }

        let reply = self
            .resolve_question(&request, &question, &policy, origin, deadline)
            .await;

        match reply {
            Some(reply) => {
                let bytes = reply.bytes.clone();
                self.log(started_wall, started, &question, origin, Some(&policy), reply);
                Some(bytes)
            }
            None => {
                // Synthesis failed somewhere unrecoverable.
                let reply = Reply::synth(
                    &wire::servfail_for(&request),
                    ResultReason::ErrorInternal,
                    vec![],
                )?;
                let bytes = reply.bytes.clone();
                self.log(started_wall, started, &question, origin, Some(&policy), reply);
                Some(bytes)
            }
        }
    }

    /// Steps 4–9 for an admitted request.
    async fn resolve_question(
        &self,
        request: &Message,
        question: &Question,
        policy: &ClientPolicy,
        origin: &QueryOrigin,
        deadline: Instant,
    ) -> Option<Reply> {
        // DDR is answered locally ahead of filtering.
        if ddr::is_ddr_question(question) {
            let response = ddr::ddr_response(request, &self.settings.ddr_templates).ok()?;
            return Reply::synth(&response, ResultReason::Ok, vec![]);
        }

        // 4. PreFilter.
        let mut applied_rules: Vec<RuleRef> = Vec::new();
        match self.engine.match_question(question, policy).await {
            Decision::Pass => {}
            Decision::Allow { rule } => applied_rules.push(rule),
            Decision::Block { rule, reason } => {
                let response = self
                    .settings
                    .sinkhole
                    .blocked_response(request, question, reason)
                    .ok()?;
                let rules = rule.into_iter().collect();
                return Reply::synth(&response, block_result(reason), rules);
            }
            Decision::Rewrite { rcode, answers, rule } => {
                let response = synth::rewrite_response(request, question, rcode, &answers).ok()?;
                return Reply::synth(&response, ResultReason::FilteredRewrite, vec![rule]);
            }
            Decision::BlockedService { service } => {
                let response = self
                    .settings
                    .sinkhole
                    .blocked_response(request, question, BlockReason::BlockList)
                    .ok()?;
                let rule = RuleRef {
                    list_id: aegis_dns_domain::USER_RULES_LIST_ID,
                    text: Arc::from(format!("blocked_service:{service}")),
                };
                return Reply::synth(
                    &response,
                    ResultReason::FilteredBlockedService,
                    vec![rule],
                );
            }
            Decision::SafeSearch { value, rule } => {
                let response = synth::rewrite_response(
                    request,
                    question,
                    aegis_dns_domain::RewriteRcode::NoError,
                    std::slice::from_ref(&value),
                )
                .ok()?;
                return Reply::synth(&response, ResultReason::FilteredSafeSearch, vec![rule]);
            }
        }

        // 5. LocalAnswer.
        if let Some(reply) = self.local_answer(request, question) {
            return Some(reply);
        }

        // 6. CacheLookup.
        let fingerprint = RequestFingerprint::new(question, policy.key.clone())
            .with_subnet(wire::client_subnet_of(request));

        match self.cache.get(&fingerprint) {
            CacheLookup::Fresh(hit) => {
                let mut message = hit.message;
                message.set_id(request.id());
                let mut reply = Reply::synth(&message, ResultReason::Ok, applied_rules)?;
                reply.cached = true;
                reply.upstream = Some(format!("cache:{}", hit.upstream));
                return Some(reply);
            }
            CacheLookup::Stale(hit) => {
                self.spawn_optimistic_refresh(question.clone(), fingerprint, policy);
                let mut message = hit.message;
                message.set_id(request.id());
                let mut reply = Reply::synth(&message, ResultReason::ServedStale, applied_rules)?;
                reply.cached = true;
                reply.upstream = Some(format!("cache:{}", hit.upstream));
                return Some(reply);
            }
            CacheLookup::Miss => {}
        }

        // 7. Forward.
        let upstream_query = self.build_upstream_query(request, origin)?;
        let answer = match self
            .forwarder
            .forward(
                &upstream_query,
                question,
                policy.upstreams.as_deref(),
                deadline,
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                debug!(question = %question, error = %e, "Forward failed");
                return Reply::synth(
                    &wire::servfail_for(request),
                    ResultReason::ErrorUpstream,
                    applied_rules,
                );
            }
        };

        let Ok(mut response) = Message::from_vec(&answer.bytes) else {
            return Reply::synth(
                &wire::servfail_for(request),
                ResultReason::ErrorUpstream,
                applied_rules,
            );
        };
        response.set_id(request.id());
        let upstream_us = Some(answer.elapsed.as_micros() as u64);

        // 8. PostFilter over the answer section.
        match self
            .engine
            .match_response(question, &wire::answer_records(&response), policy)
        {
            Decision::Block { rule, reason } => {
                let blocked = self
                    .settings
                    .sinkhole
                    .blocked_response(request, question, reason)
                    .ok()?;
                applied_rules.extend(rule);
                let mut reply = Reply::synth(&blocked, block_result(reason), applied_rules)?;
                reply.upstream = Some(answer.upstream.to_string());
                reply.upstream_us = upstream_us;
                return Some(reply);
            }
            Decision::Rewrite { rcode, answers, rule } => {
                let rewritten =
                    synth::rewrite_response(request, question, rcode, &answers).ok()?;
                applied_rules.push(rule);
                let mut reply =
                    Reply::synth(&rewritten, ResultReason::FilteredRewrite, applied_rules)?;
                reply.upstream = Some(answer.upstream.to_string());
                reply.upstream_us = upstream_us;
                return Some(reply);
            }
            Decision::Allow { rule } => applied_rules.push(rule),
            _ => {}
        }

        // 9. CachePut.
        self.cache.put(
            fingerprint,
            &response,
            Arc::clone(&answer.upstream),
            answer.bytes.len(),
        );

        let mut reply = Reply::synth(&response, ResultReason::Ok, applied_rules)?;
        reply.upstream = Some(answer.upstream.to_string());
        reply.upstream_us = upstream_us;
        Some(reply)
    }

    /// Hosts/DHCP view synthesis: PTR inside covered ranges, A/AAAA for
    /// locally-known names.
    fn local_answer(&self, request: &Message, question: &Question) -> Option<Reply> {
        match question.qtype {
            RecordType::PTR => {
                let ip = wire::ptr_name_to_ip(&question.name)?;
                if !self.hosts.covers(ip) {
                    return None;
                }
                let names = self.hosts.reverse(ip);
                let response = synth::local_ptr_response(request, question, &names).ok()?;
                Reply::synth(&response, ResultReason::RewrittenAutoClient, vec![])
            }
            RecordType::A | RecordType::AAAA => {
                let ips = self.hosts.lookup(&question.name);
                if ips.is_empty() {
                    return None;
                }
                let response = synth::local_address_response(request, question, &ips).ok()?;
                Reply::synth(&response, ResultReason::RewrittenAutoClient, vec![])
            }
            _ => None,
        }
    }

    /// The message actually sent upstream: the client's message (EDNS buffer
    /// size and DO bit preserved) plus our ECS option when configured.
    fn build_upstream_query(&self, request: &Message, origin: &QueryOrigin) -> Option<Vec<u8>> {
        let needs_ecs =
            self.settings.ecs_enabled && wire::client_subnet_of(request).is_none();
        if !needs_ecs {
            return wire::encode(request).ok();
        }

        let mut outgoing = request.clone();
        wire::attach_client_subnet(
            &mut outgoing,
            origin.ip(),
            self.settings.ecs_prefix_v4,
            self.settings.ecs_prefix_v6,
        );
        wire::encode(&outgoing).ok()
    }

    /// At most one background refresh per fingerprint (the cache tracks the
    /// in-flight set); the spawned task owns its forward and always releases
    /// the slot.
    fn spawn_optimistic_refresh(
        &self,
        question: Question,
        fingerprint: RequestFingerprint,
        policy: &ClientPolicy,
    ) {
        if !self.cache.begin_refresh(&fingerprint) {
            return;
        }

        let forwarder = Arc::clone(&self.forwarder);
        let cache = Arc::clone(&self.cache);
        let upstreams = policy.upstreams.clone();
        let budget = self.settings.request_budget;

        tokio::spawn(async move {
            let deadline = Instant::now() + budget;
            let refresh = async {
                let query = wire::build_query(&question, false)?;
                let bytes = wire::encode(&query)?;
                let answer = forwarder
                    .forward(&bytes, &question, upstreams.as_deref(), deadline)
                    .await?;
                let message = Message::from_vec(&answer.bytes)
                    .map_err(|e| aegis_dns_domain::CoreError::WireFormat(e.to_string()))?;
                cache.put(
                    fingerprint.clone(),
                    &message,
                    Arc::clone(&answer.upstream),
                    answer.bytes.len(),
                );
                Ok::<(), aegis_dns_domain::CoreError>(())
            };

            if let Err(e) = refresh.await {
                debug!(question = %question, error = %e, "Optimistic refresh failed");
            }
            cache.end_refresh(&fingerprint);
        });
    }

    fn log(
        &self,
        started_wall: chrono::DateTime<Utc>,
        started: Instant,
        question: &Question,
        origin: &QueryOrigin,
        policy: Option<&ClientPolicy>,
        reply: Reply,
    ) {
        let record = QueryLogRecord {
            started_at: started_wall,
            name: Arc::clone(&question.name),
            qtype: question.qtype,
            qclass: question.qclass,
            proto: origin.proto.to_string(),
            result: reply.result,
            rcode: reply.rcode,
            rules: reply
                .rules
                .iter()
                .map(|r| (r.list_id, r.text.to_string()))
                .collect(),
            upstream: reply.upstream,
            elapsed_us: started.elapsed().as_micros() as u64,
            upstream_us: reply.upstream_us,
            response_size: reply.bytes.len(),
            client_ip: Some(origin.ip()),
            client_name: policy
                .and_then(|p| p.name.as_deref())
                .map(str::to_string),
            cached: reply.cached,
        };

        self.stats.record(&record);
        self.querylog.append(record);
    }
}

fn block_result(reason: BlockReason) -> ResultReason {
    match reason {
        BlockReason::BlockList => ResultReason::FilteredBlockList,
        BlockReason::SafeBrowsing => ResultReason::FilteredSafeBrowsing,
        BlockReason::Parental => ResultReason::FilteredParental,
    }
}
