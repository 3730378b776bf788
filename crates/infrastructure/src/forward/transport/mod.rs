pub mod https;
pub mod tcp;
pub mod tls;
pub mod udp;

#[cfg(feature = "dns-over-quic")]
pub mod quic;

use aegis_dns_domain::CoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Sends one raw DNS message and returns the raw response.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, CoreError>;

    fn protocol_name(&self) -> &'static str;
}

/// Enum-dispatched transport, stack-allocated on the query path.
pub enum Transport {
    Udp(udp::UdpTransport),
    Tcp(tcp::TcpTransport),
    #[cfg(feature = "dns-over-rustls")]
    Tls(tls::TlsTransport),
    #[cfg(feature = "dns-over-https")]
    Https(https::HttpsTransport),
    #[cfg(feature = "dns-over-quic")]
    Quic(quic::QuicTransport),
}

impl Transport {
    pub async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, CoreError> {
        match self {
            Self::Udp(t) => t.exchange(query, timeout).await,
            Self::Tcp(t) => t.exchange(query, timeout).await,
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(t) => t.exchange(query, timeout).await,
            #[cfg(feature = "dns-over-https")]
            Self::Https(t) => t.exchange(query, timeout).await,
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(t) => t.exchange(query, timeout).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::Udp(_) => "UDP",
            Self::Tcp(_) => "TCP",
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(_) => "TLS",
            #[cfg(feature = "dns-over-https")]
            Self::Https(_) => "HTTPS",
            #[cfg(feature = "dns-over-quic")]
            Self::Quic(_) => "QUIC",
        }
    }
}

/// True when the wire header has the TC bit set; callers retry over TCP.
pub fn is_truncated(response: &[u8]) -> bool {
    response.len() > 2 && response[2] & 0x02 != 0
}
