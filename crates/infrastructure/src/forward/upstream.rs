use super::bootstrap::Bootstrap;
use super::transport::{self, Transport};
use super::url::{Scheme, UpstreamUrl};
use aegis_dns_domain::CoreError;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

#[cfg(feature = "dns-over-quic")]
use super::transport::quic::QuicTransport;

/// How long a bootstrap-resolved address is reused before re-resolving.
const RESOLVE_TTL: Duration = Duration::from_secs(300);
/// EWMA weight of the newest RTT sample.
const RTT_ALPHA: f64 = 0.3;
/// Starting RTT estimate before the first sample, microseconds.
const RTT_INITIAL_US: u64 = 50_000;

/// One configured upstream endpoint with its RTT estimate and resolved
/// address cache.
pub struct Upstream {
    url: UpstreamUrl,
    rtt_us: AtomicU64,
    resolved: Mutex<Option<(SocketAddr, Instant)>>,
    #[cfg(feature = "dns-over-quic")]
    quic: tokio::sync::Mutex<Option<Arc<QuicTransport>>>,
}

impl Upstream {
    pub fn new(url: UpstreamUrl) -> Self {
        Self {
            url,
            rtt_us: AtomicU64::new(RTT_INITIAL_US),
            resolved: Mutex::new(None),
            #[cfg(feature = "dns-over-quic")]
            quic: tokio::sync::Mutex::new(None),
        }
    }

    pub fn display(&self) -> Arc<str> {
        Arc::clone(&self.url.display)
    }

    pub fn rtt(&self) -> Duration {
        Duration::from_micros(self.rtt_us.load(Ordering::Relaxed))
    }

    fn observe_rtt(&self, sample: Duration) {
        let sample = sample.as_micros() as f64;
        let current = self.rtt_us.load(Ordering::Relaxed) as f64;
        let next = current * (1.0 - RTT_ALPHA) + sample * RTT_ALPHA;
        self.rtt_us.store(next as u64, Ordering::Relaxed);
    }

    /// Endpoint address: IP literals short-circuit, hostnames go through the
    /// bootstrap pool, results cached briefly.
    async fn addr(&self, bootstrap: &Bootstrap) -> Result<SocketAddr, CoreError> {
        if let Ok(ip) = self.url.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.url.port));
        }

        if let Some((addr, resolved_at)) = *self.resolved.lock().unwrap() {
            if resolved_at.elapsed() < RESOLVE_TTL {
                return Ok(addr);
            }
        }

        let ips = bootstrap.resolve(&self.url.host).await?;
        let ip = *ips
            .first()
            .ok_or_else(|| CoreError::BootstrapFailed(self.url.host.clone()))?;
        let addr = SocketAddr::new(ip, self.url.port);
        *self.resolved.lock().unwrap() = Some((addr, Instant::now()));
        Ok(addr)
    }

    /// One full exchange with this upstream, including the single TCP retry
    /// on truncation or UDP transport failure.
    pub async fn exchange(
        &self,
        query: &[u8],
        timeout: Duration,
        bootstrap: &Bootstrap,
    ) -> Result<Vec<u8>, CoreError> {
        let started = Instant::now();
        let response = self.exchange_inner(query, timeout, bootstrap).await?;

        // Responses must correlate and must parse at least to a header.
        if response.len() < 12 {
            return Err(CoreError::WireFormat("short upstream response".into()));
        }
        if response[0] != query[0] || response[1] != query[1] {
            return Err(CoreError::WireFormat("upstream response id mismatch".into()));
        }
        // SERVFAIL counts as failure so strategies can try elsewhere.
        if response[3] & 0x0f == 2 {
            return Err(CoreError::UpstreamFailed(format!(
                "{} answered SERVFAIL",
                self.url.display
            )));
        }

        self.observe_rtt(started.elapsed());
        Ok(response)
    }

    async fn exchange_inner(
        &self,
        query: &[u8],
        timeout: Duration,
        bootstrap: &Bootstrap,
    ) -> Result<Vec<u8>, CoreError> {
        match self.url.scheme {
            Scheme::Udp => {
                let addr = self.addr(bootstrap).await?;
                let udp = Transport::Udp(transport::udp::UdpTransport::new(addr));
                match udp.exchange(query, timeout).await {
                    Ok(response) if !transport::is_truncated(&response) => Ok(response),
                    Ok(_) => {
                        debug!(upstream = %self.url.display, "Truncated UDP answer; retrying over TCP");
                        let tcp = Transport::Tcp(transport::tcp::TcpTransport::new(addr));
                        tcp.exchange(query, timeout).await
                    }
                    Err(e) => {
                        debug!(upstream = %self.url.display, error = %e, "UDP failed; retrying over TCP");
                        let tcp = Transport::Tcp(transport::tcp::TcpTransport::new(addr));
                        tcp.exchange(query, timeout).await
                    }
                }
            }
            Scheme::Tcp => {
                let addr = self.addr(bootstrap).await?;
                Transport::Tcp(transport::tcp::TcpTransport::new(addr))
                    .exchange(query, timeout)
                    .await
            }
            #[cfg(feature = "dns-over-rustls")]
            Scheme::Tls => {
                let addr = self.addr(bootstrap).await?;
                Transport::Tls(transport::tls::TlsTransport::new(
                    addr,
                    Arc::from(self.url.host.as_str()),
                ))
                .exchange(query, timeout)
                .await
            }
            #[cfg(not(feature = "dns-over-rustls"))]
            Scheme::Tls => Err(CoreError::InvalidUpstream(
                "built without dns-over-rustls".into(),
            )),
            #[cfg(feature = "dns-over-https")]
            Scheme::Https | Scheme::H3 => {
                let resolved = if self.url.host_is_literal() {
                    None
                } else {
                    let addr = self.addr(bootstrap).await?;
                    Some((self.url.host.clone(), addr))
                };
                Transport::Https(transport::https::HttpsTransport::new(
                    self.url.https_url(),
                    resolved,
                    self.url.scheme == Scheme::H3,
                ))
                .exchange(query, timeout)
                .await
            }
            #[cfg(not(feature = "dns-over-https"))]
            Scheme::Https | Scheme::H3 => Err(CoreError::InvalidUpstream(
                "built without dns-over-https".into(),
            )),
            #[cfg(feature = "dns-over-quic")]
            Scheme::Quic => {
                let addr = self.addr(bootstrap).await?;
                let quic = {
                    let mut guard = self.quic.lock().await;
                    match guard.as_ref() {
                        Some(t) => Arc::clone(t),
                        None => {
                            let t = Arc::new(QuicTransport::new(
                                addr,
                                Arc::from(self.url.host.as_str()),
                            ));
                            *guard = Some(Arc::clone(&t));
                            t
                        }
                    }
                };
                use super::transport::DnsTransport as _;
                quic.exchange(query, timeout).await
            }
            #[cfg(not(feature = "dns-over-quic"))]
            Scheme::Quic => Err(CoreError::InvalidUpstream(
                "built without dns-over-quic".into(),
            )),
        }
    }
}
