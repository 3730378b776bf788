//! Upstream selection strategies: RTT-weighted load balancing, full fan-out
//! races, and the fastest-answer-address probe.

use super::bootstrap::Bootstrap;
use super::upstream::Upstream;
use aegis_dns_domain::CoreError;
use futures::future::join_all;
use hickory_proto::op::Message;
use hickory_proto::rr::RData;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// One successful exchange.
pub struct ExchangeOutcome {
    pub bytes: Vec<u8>,
    pub upstream: Arc<str>,
    pub elapsed: Duration,
}

async fn try_one(
    upstream: &Arc<Upstream>,
    query: &[u8],
    timeout: Duration,
    bootstrap: &Bootstrap,
) -> Result<ExchangeOutcome, CoreError> {
    let started = Instant::now();
    let bytes = upstream.exchange(query, timeout, bootstrap).await?;
    Ok(ExchangeOutcome {
        bytes,
        upstream: upstream.display(),
        elapsed: started.elapsed(),
    })
}

/// One upstream per query, chosen by RTT-weighted random; the rest serve as
/// an ordered fallback chain.
pub async fn load_balance(
    upstreams: &[Arc<Upstream>],
    query: &[u8],
    timeout: Duration,
    bootstrap: &Bootstrap,
) -> Result<ExchangeOutcome, CoreError> {
    let mut order: Vec<&Arc<Upstream>> = upstreams.iter().collect();

    // Weighted pick for the first slot; lower RTT → higher weight.
    if order.len() > 1 {
        let weights: Vec<f64> = order
            .iter()
            .map(|u| 1.0 / (u.rtt().as_micros() as f64 + 1_000.0))
            .collect();
        let total: f64 = weights.iter().sum();
        let mut roll = fastrand::f64() * total;
        let mut picked = 0;
        for (i, w) in weights.iter().enumerate() {
            roll -= w;
            if roll <= 0.0 {
                picked = i;
                break;
            }
        }
        order.swap(0, picked);
    }

    let mut last_err = CoreError::UpstreamFailed("no upstreams".into());
    for upstream in order {
        match try_one(upstream, query, timeout, bootstrap).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                debug!(upstream = %upstream.display(), error = %e, "Upstream failed; trying next");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Fan out to every upstream; first success wins, losers are cancelled by
/// drop (structured: the race owns its branches).
pub async fn parallel_all(
    upstreams: &[Arc<Upstream>],
    query: &[u8],
    timeout: Duration,
    bootstrap: &Bootstrap,
) -> Result<ExchangeOutcome, CoreError> {
    let futures: Vec<_> = upstreams
        .iter()
        .map(|u| Box::pin(try_one(u, query, timeout, bootstrap)))
        .collect();

    match futures::future::select_ok(futures).await {
        Ok((outcome, _rest)) => Ok(outcome),
        Err(e) => Err(e),
    }
}

/// Fan out everywhere, then prefer the response whose answer address probes
/// fastest inside the window. Falls back to the quickest response when no
/// probe completes.
pub async fn fastest_ip(
    upstreams: &[Arc<Upstream>],
    query: &[u8],
    timeout: Duration,
    probe_window: Duration,
    bootstrap: &Bootstrap,
) -> Result<ExchangeOutcome, CoreError> {
    let futures: Vec<_> = upstreams
        .iter()
        .map(|u| try_one(u, query, timeout, bootstrap))
        .collect();

    let mut outcomes: Vec<ExchangeOutcome> = join_all(futures)
        .await
        .into_iter()
        .filter_map(Result::ok)
        .collect();

    if outcomes.is_empty() {
        return Err(CoreError::UpstreamFailed("all upstreams failed".into()));
    }
    if outcomes.len() == 1 {
        return Ok(outcomes.remove(0));
    }

    // Probe every distinct answer address once.
    let mut addresses: Vec<IpAddr> = Vec::new();
    for outcome in &outcomes {
        for ip in answer_ips(&outcome.bytes) {
            if !addresses.contains(&ip) {
                addresses.push(ip);
            }
        }
    }

    let probes: Vec<_> = addresses
        .iter()
        .map(|ip| {
            let ip = *ip;
            async move { (ip, probe_rtt(ip, probe_window).await) }
        })
        .collect();
    let probe_results = join_all(probes).await;

    let fastest = probe_results
        .into_iter()
        .filter_map(|(ip, rtt)| rtt.map(|r| (ip, r)))
        .min_by_key(|(_, rtt)| *rtt);

    match fastest {
        Some((fastest_ip, rtt)) => {
            debug!(ip = %fastest_ip, rtt_ms = rtt.as_millis() as u64, "Fastest answer address");
            let best = outcomes
                .iter()
                .position(|o| answer_ips(&o.bytes).contains(&fastest_ip))
                .unwrap_or(0);
            Ok(outcomes.remove(best))
        }
        None => {
            // No address answered the probe; take the quickest exchange.
            let best = outcomes
                .iter()
                .enumerate()
                .min_by_key(|(_, o)| o.elapsed)
                .map(|(i, _)| i)
                .unwrap_or(0);
            Ok(outcomes.remove(best))
        }
    }
}

/// TCP connect time to the address, as a reachability proxy.
async fn probe_rtt(ip: IpAddr, window: Duration) -> Option<Duration> {
    let addr = SocketAddr::new(ip, 443);
    let started = Instant::now();
    match tokio::time::timeout(window, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => Some(started.elapsed()),
        _ => None,
    }
}

fn answer_ips(bytes: &[u8]) -> Vec<IpAddr> {
    let Ok(message) = Message::from_vec(bytes) else {
        return Vec::new();
    };
    message
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            RData::A(a) => Some(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect()
}
