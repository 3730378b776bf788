//! End-to-end pipeline scenarios: parse → filter → cache → forward → log.

#[path = "../common/mod.rs"]
mod common;

use aegis_dns_domain::{PersistentClient, QueryLogSearch, RecordType, ResultReason};
use common::{build, origin, query_bytes, FixtureOptions, StubForwarder};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::svcb::{SvcParamKey, SvcParamValue};
use hickory_proto::rr::RData;
use std::time::Duration;

fn parse(bytes: &[u8]) -> Message {
    Message::from_vec(bytes).unwrap()
}

#[tokio::test]
async fn blocklist_hit_answers_sinkhole_and_logs() {
    let fixture = build(FixtureOptions {
        lists: vec![(1, "||ads.example.com^\n".to_string())],
        ..Default::default()
    });

    let response = fixture
        .pipeline
        .handle(
            &query_bytes("www.ads.example.com", RecordType::A),
            &origin("192.168.1.50"),
        )
        .await
        .expect("udp always answers");

    let message = parse(&response);
    assert_eq!(message.response_code(), ResponseCode::NoError);
    assert_eq!(message.answers().len(), 1);
    assert!(message.answers()[0].ttl() >= 1);
    assert!(matches!(
        message.answers()[0].data(),
        RData::A(a) if a.0.is_unspecified()
    ));

    // Never reached the upstream.
    assert_eq!(fixture.forwarder.call_count(), 0);

    let records = fixture.querylog.search(&QueryLogSearch::default());
    assert_eq!(records[0].result, ResultReason::FilteredBlockList);
    assert!(!records[0].rules.is_empty());
}

#[tokio::test]
async fn allow_rule_overrides_block_and_proxies_upstream() {
    let fixture = build(FixtureOptions {
        lists: vec![(1, "||ads.example.com^\n".to_string())],
        user_rules: vec!["@@||ads.example.com^".to_string()],
        ..Default::default()
    });

    let response = fixture
        .pipeline
        .handle(
            &query_bytes("www.ads.example.com", RecordType::A),
            &origin("192.168.1.50"),
        )
        .await
        .unwrap();

    let message = parse(&response);
    assert_eq!(message.response_code(), ResponseCode::NoError);
    assert!(matches!(
        message.answers()[0].data(),
        RData::A(a) if a.0.to_string() == "93.184.216.34"
    ));
    assert_eq!(fixture.forwarder.call_count(), 1);

    let records = fixture.querylog.search(&QueryLogSearch::default());
    assert_eq!(records[0].result, ResultReason::Ok);
    // The allow rule is recorded informationally.
    assert!(records[0].rules.iter().any(|(_, text)| text.contains("@@")));
}

#[tokio::test]
async fn dnsrewrite_synthesizes_https_with_ech() {
    let fixture = build(FixtureOptions {
        user_rules: vec!["example.com$dnsrewrite=NOERROR;HTTPS;1 . alpn=h2 ech=AAAA".to_string()],
        ..Default::default()
    });

    let response = fixture
        .pipeline
        .handle(
            &query_bytes("example.com", RecordType::HTTPS),
            &origin("192.168.1.50"),
        )
        .await
        .unwrap();

    let message = parse(&response);
    assert_eq!(message.answers().len(), 1);
    let RData::HTTPS(https) = message.answers()[0].data() else {
        panic!("expected HTTPS rdata");
    };
    assert_eq!(https.0.svc_priority(), 1);
    let params = https.0.svc_params();
    assert!(params
        .iter()
        .any(|(k, v)| *k == SvcParamKey::Alpn && matches!(v, SvcParamValue::Alpn(_))));
    assert!(params.iter().any(|(k, _)| *k == SvcParamKey::EchConfigList));

    let records = fixture.querylog.search(&QueryLogSearch::default());
    assert_eq!(records[0].result, ResultReason::FilteredRewrite);
}

#[tokio::test(flavor = "multi_thread")]
async fn optimistic_cache_serves_stale_with_single_refresh() {
    // The refresh delay keeps the background forward observably in flight
    // while the stale hits land.
    let forwarder =
        StubForwarder::with_ttl_and_delay("93.184.216.34", 1, Duration::from_millis(300));
    let fixture = build(FixtureOptions {
        optimistic: true,
        forwarder,
        ..Default::default()
    });

    // Seed the cache through a normal forward (TTL 1s).
    fixture
        .pipeline
        .handle(
            &query_bytes("example.org", RecordType::A),
            &origin("192.168.1.50"),
        )
        .await
        .unwrap();
    assert_eq!(fixture.forwarder.call_count(), 1);

    // Let the entry expire into the stale window.
    tokio::time::sleep(Duration::from_millis(1_300)).await;

    let stale = fixture
        .pipeline
        .handle(
            &query_bytes("example.org", RecordType::A),
            &origin("192.168.1.50"),
        )
        .await
        .unwrap();
    let message = parse(&stale);
    // Stale answers carry the clamped TTL.
    assert_eq!(message.answers()[0].ttl(), 10);

    // A concurrent stale hit spawns no extra refresh.
    let again = fixture
        .pipeline
        .handle(
            &query_bytes("example.org", RecordType::A),
            &origin("192.168.1.50"),
        )
        .await
        .unwrap();
    assert_eq!(parse(&again).answers()[0].ttl(), 10);

    // Exactly one background refresh lands shortly after.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fixture.forwarder.call_count(), 2);

    let records = fixture.querylog.search(&QueryLogSearch {
        result: Some(ResultReason::ServedStale),
        ..Default::default()
    });
    assert_eq!(records.len(), 2);
    assert!(records[0]
        .upstream
        .as_deref()
        .unwrap()
        .starts_with("cache:"));
}

#[tokio::test]
async fn per_client_filtering_disabled_forwards_blocked_domain() {
    let kid = PersistentClient {
        name: "kid-tv".into(),
        ids: vec![],
        ips: vec!["10.0.0.5".parse().unwrap()],
        subnets: vec![],
        macs: vec![],
        tags: vec![],
        filtering: Some(false),
        safesearch: None,
        safebrowsing: None,
        parental: None,
        upstreams: vec![],
        blocked_services: vec![],
    };

    let fixture = build(FixtureOptions {
        lists: vec![(1, "||ads.example.com^\n".to_string())],
        clients: vec![kid],
        ..Default::default()
    });

    fixture
        .pipeline
        .handle(
            &query_bytes("ads.example.com", RecordType::A),
            &origin("10.0.0.5"),
        )
        .await
        .unwrap();

    // Forwarded upstream regardless of the global blocklist.
    assert_eq!(fixture.forwarder.call_count(), 1);
    let records = fixture.querylog.search(&QueryLogSearch::default());
    assert_eq!(records[0].result, ResultReason::Ok);
    assert_eq!(records[0].client_name.as_deref(), Some("kid-tv"));
}

#[tokio::test]
async fn local_hosts_answer_short_circuits_forwarder() {
    let fixture = build(FixtureOptions::default());
    fixture
        .pipeline
        .handle(&query_bytes("nas.lan", RecordType::A), &origin("192.168.1.50"))
        .await
        .unwrap();
    // Unknown name forwards...
    assert_eq!(fixture.forwarder.call_count(), 1);

    // ...but a known one answers locally.
    let fixture = build(FixtureOptions::default());
    fixture
        .hosts
        .apply_hosts(aegis_dns_infrastructure::hosts::parse_hosts("192.168.1.10 nas"));
    let response = fixture
        .pipeline
        .handle(&query_bytes("nas.lan", RecordType::A), &origin("192.168.1.50"))
        .await
        .unwrap();
    let message = parse(&response);
    assert_eq!(message.answers().len(), 1);
    assert_eq!(fixture.forwarder.call_count(), 0);

    let records = fixture.querylog.search(&QueryLogSearch::default());
    assert_eq!(records[0].result, ResultReason::RewrittenAutoClient);
}

#[tokio::test]
async fn malformed_packet_gets_formerr() {
    let fixture = build(FixtureOptions::default());
    let garbage = vec![0xde, 0xad, 0xbe, 0xef];
    let response = fixture
        .pipeline
        .handle(&garbage, &origin("192.168.1.50"))
        .await
        .unwrap();
    let message = parse(&response);
    assert_eq!(message.response_code(), ResponseCode::FormErr);
    assert_eq!(message.id(), 0xdead);

    let records = fixture.querylog.search(&QueryLogSearch {
        result: Some(ResultReason::ErrorFormat),
        ..Default::default()
    });
    assert_eq!(records.len(), 1);
}
