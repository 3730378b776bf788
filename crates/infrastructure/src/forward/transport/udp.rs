use super::DnsTransport;
use aegis_dns_domain::CoreError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Maximum UDP response size with EDNS(0).
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Plain DNS over UDP. Truncated responses are the caller's cue to retry
/// over TCP.
pub struct UdpTransport {
    server_addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, CoreError> {
        let bind_addr: SocketAddr = if self.server_addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| CoreError::Io(format!("bind failed: {e}")))?;

        tokio::time::timeout(timeout, socket.send_to(query, self.server_addr))
            .await
            .map_err(|_| CoreError::QueryTimeout)?
            .map_err(|e| {
                CoreError::Io(format!("send to {} failed: {e}", self.server_addr))
            })?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let (len, from) = tokio::time::timeout(timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| CoreError::QueryTimeout)?
            .map_err(|e| {
                CoreError::Io(format!("recv from {} failed: {e}", self.server_addr))
            })?;

        if from.ip() != self.server_addr.ip() {
            warn!(
                expected = %self.server_addr,
                received_from = %from,
                "UDP response from unexpected source"
            );
        }

        buf.truncate(len);
        debug!(server = %self.server_addr, bytes = len, "UDP response received");
        Ok(buf)
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }
}
