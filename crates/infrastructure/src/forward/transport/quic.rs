use super::DnsTransport;
use aegis_dns_domain::CoreError;
use async_trait::async_trait;
use quinn::crypto::rustls::QuicClientConfig;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// DoQ ALPN token (RFC 9250 §5.1).
const DOQ_ALPN: &[u8] = b"doq";

static QUIC_CLIENT_CONFIG: LazyLock<Arc<QuicClientConfig>> = LazyLock::new(|| {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let mut tls = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    tls.alpn_protocols = vec![DOQ_ALPN.to_vec()];
    Arc::new(QuicClientConfig::try_from(tls).expect("static TLS config is QUIC-compatible"))
});

/// DNS over QUIC (RFC 9250): one bidirectional stream per query, the
/// two-byte length framing, message id zero on the wire.
///
/// Endpoint and connection are cached together (the endpoint drives the
/// connection's I/O) and re-dialed after a close.
pub struct QuicTransport {
    server_addr: SocketAddr,
    server_name: Arc<str>,
    session: Mutex<Option<(quinn::Endpoint, quinn::Connection)>>,
}

impl QuicTransport {
    pub fn new(server_addr: SocketAddr, server_name: Arc<str>) -> Self {
        Self {
            server_addr,
            server_name,
            session: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<(quinn::Endpoint, quinn::Connection), CoreError> {
        let bind: SocketAddr = if self.server_addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let mut endpoint = quinn::Endpoint::client(bind)
            .map_err(|e| CoreError::Io(format!("QUIC endpoint failed: {e}")))?;
        endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::clone(
            &QUIC_CLIENT_CONFIG,
        )));

        let connection = endpoint
            .connect(self.server_addr, &self.server_name)
            .map_err(|e| CoreError::Io(format!("QUIC connect failed: {e}")))?
            .await
            .map_err(|e| {
                CoreError::Io(format!("QUIC handshake with {} failed: {e}", self.server_name))
            })?;

        Ok((endpoint, connection))
    }

    async fn connection(&self) -> Result<quinn::Connection, CoreError> {
        let mut guard = self.session.lock().await;
        if let Some((_, connection)) = guard.as_ref() {
            if connection.close_reason().is_none() {
                return Ok(connection.clone());
            }
        }
        let fresh = self.connect().await?;
        let connection = fresh.1.clone();
        *guard = Some(fresh);
        Ok(connection)
    }

    async fn exchange_once(&self, query: &[u8]) -> Result<Vec<u8>, CoreError> {
        let connection = self.connection().await?;
        let (mut send, mut recv) = connection
            .open_bi()
            .await
            .map_err(|e| CoreError::Io(format!("QUIC stream failed: {e}")))?;

        let len = u16::try_from(query.len())
            .map_err(|_| CoreError::WireFormat("query exceeds 64KiB".into()))?;
        send.write_all(&len.to_be_bytes())
            .await
            .map_err(|e| CoreError::Io(format!("QUIC write failed: {e}")))?;
        send.write_all(query)
            .await
            .map_err(|e| CoreError::Io(format!("QUIC write failed: {e}")))?;
        send.finish()
            .map_err(|e| CoreError::Io(format!("QUIC finish failed: {e}")))?;

        let framed = recv
            .read_to_end(65_537)
            .await
            .map_err(|e| CoreError::Io(format!("QUIC read failed: {e}")))?;
        if framed.len() < 2 {
            return Err(CoreError::WireFormat("short DoQ response".into()));
        }
        let declared = u16::from_be_bytes([framed[0], framed[1]]) as usize;
        let body = &framed[2..];
        if body.len() != declared {
            return Err(CoreError::WireFormat("DoQ length mismatch".into()));
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DnsTransport for QuicTransport {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, CoreError> {
        // RFC 9250 §4.2.1: the wire message id must be zero. The original id
        // is restored on the response so callers can keep correlating by id.
        let original_id = if query.len() >= 2 {
            [query[0], query[1]]
        } else {
            [0, 0]
        };
        let mut query = query.to_vec();
        if query.len() >= 2 {
            query[0] = 0;
            query[1] = 0;
        }

        let mut response = tokio::time::timeout(timeout, self.exchange_once(&query))
            .await
            .map_err(|_| CoreError::QueryTimeout)??;

        if response.len() >= 2 {
            response[0] = original_id[0];
            response[1] = original_id[1];
        }

        debug!(server = %self.server_addr, bytes = response.len(), "DoQ response received");
        Ok(response)
    }

    fn protocol_name(&self) -> &'static str {
        "QUIC"
    }
}
