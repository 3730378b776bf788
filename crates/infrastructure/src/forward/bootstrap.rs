//! Bootstrap resolution: a static pool of plain resolvers used only to turn
//! upstream hostnames into addresses.

use crate::wire;
use aegis_dns_domain::{CoreError, Question, RecordType};
use dashmap::DashMap;
use hickory_proto::op::Message;
use hickory_proto::rr::RData;
use rustc_hash::FxBuildHasher;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Fallback positive TTL when the answer carries none.
const DEFAULT_TTL: Duration = Duration::from_secs(300);
/// A failed resolution stays fatal for the upstream this long.
const FAILURE_TTL: Duration = Duration::from_secs(60);
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

enum CachedResolution {
    Ok(Vec<IpAddr>),
    Failed,
}

pub struct Bootstrap {
    servers: Vec<SocketAddr>,
    cache: DashMap<String, (CachedResolution, Instant), FxBuildHasher>,
}

impl Bootstrap {
    /// Bootstrap entries must be plain `ip[:port]`; hostnames here would
    /// need a bootstrap of their own.
    pub fn new(servers: &[String]) -> Result<Self, CoreError> {
        let mut parsed = Vec::with_capacity(servers.len());
        for server in servers {
            let addr = if let Ok(ip) = server.parse::<IpAddr>() {
                SocketAddr::new(ip, 53)
            } else {
                server.parse::<SocketAddr>().map_err(|_| {
                    CoreError::InvalidConfig(format!("bootstrap must be an IP: {server}"))
                })?
            };
            parsed.push(addr);
        }
        Ok(Self {
            servers: parsed,
            cache: DashMap::with_hasher(FxBuildHasher),
        })
    }

    /// Resolve `host` through the bootstrap pool. Failures are cached so a
    /// dead name stays fatal for its upstream until the failure TTL lapses.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, CoreError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some(entry) = self.cache.get(host) {
            let (resolution, expires) = &*entry;
            if Instant::now() < *expires {
                return match resolution {
                    CachedResolution::Ok(ips) => Ok(ips.clone()),
                    CachedResolution::Failed => {
                        Err(CoreError::BootstrapFailed(host.to_string()))
                    }
                };
            }
        }

        match self.query_servers(host).await {
            Ok((ips, ttl)) => {
                self.cache.insert(
                    host.to_string(),
                    (CachedResolution::Ok(ips.clone()), Instant::now() + ttl),
                );
                Ok(ips)
            }
            Err(e) => {
                warn!(host = %host, error = %e, "Bootstrap resolution failed");
                self.cache.insert(
                    host.to_string(),
                    (CachedResolution::Failed, Instant::now() + FAILURE_TTL),
                );
                Err(CoreError::BootstrapFailed(host.to_string()))
            }
        }
    }

    async fn query_servers(&self, host: &str) -> Result<(Vec<IpAddr>, Duration), CoreError> {
        if self.servers.is_empty() {
            return Err(CoreError::BootstrapFailed("no bootstrap servers".into()));
        }

        let mut last_err = CoreError::BootstrapFailed(host.to_string());
        for server in &self.servers {
            match self.query_one(*server, host).await {
                Ok(result) if !result.0.is_empty() => {
                    debug!(host = %host, server = %server, ips = result.0.len(), "Bootstrap resolved");
                    return Ok(result);
                }
                Ok(_) => continue,
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// One A query (and an AAAA follow-up) against one bootstrap server.
    async fn query_one(
        &self,
        server: SocketAddr,
        host: &str,
    ) -> Result<(Vec<IpAddr>, Duration), CoreError> {
        let mut ips = Vec::new();
        let mut min_ttl: Option<u32> = None;

        for qtype in [RecordType::A, RecordType::AAAA] {
            let question = Question::new(host, qtype);
            let query = wire::build_query(&question, false)?;
            let bytes = wire::encode(&query)?;

            let bind: SocketAddr = if server.is_ipv4() {
                (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
            } else {
                (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
            };
            let socket = UdpSocket::bind(bind).await?;
            socket.send_to(&bytes, server).await?;

            let mut buf = vec![0u8; 4096];
            let (len, _) = tokio::time::timeout(BOOTSTRAP_TIMEOUT, socket.recv_from(&mut buf))
                .await
                .map_err(|_| CoreError::QueryTimeout)??;
            buf.truncate(len);

            let response = Message::from_vec(&buf)
                .map_err(|e| CoreError::WireFormat(e.to_string()))?;
            for record in response.answers() {
                match record.data() {
                    RData::A(a) => ips.push(IpAddr::V4(a.0)),
                    RData::AAAA(aaaa) => ips.push(IpAddr::V6(aaaa.0)),
                    _ => continue,
                }
                min_ttl = Some(min_ttl.map_or(record.ttl(), |t| t.min(record.ttl())));
            }
        }

        let ttl = min_ttl
            .map(|t| Duration::from_secs(u64::from(t.max(10))))
            .unwrap_or(DEFAULT_TTL);
        Ok((ips, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_hosts_skip_the_network() {
        let b = Bootstrap::new(&["9.9.9.10".to_string()]).unwrap();
        let ips = futures::executor::block_on(b.resolve("1.2.3.4")).unwrap();
        assert_eq!(ips, vec!["1.2.3.4".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn hostname_bootstrap_entries_rejected() {
        assert!(Bootstrap::new(&["dns.example".to_string()]).is_err());
        assert!(Bootstrap::new(&["9.9.9.10:53".to_string()]).is_ok());
    }
}
