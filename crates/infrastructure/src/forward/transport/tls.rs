use super::tcp::framed_exchange;
use super::DnsTransport;
use aegis_dns_domain::CoreError;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Shared client config with the webpki root store; building it per query
/// would redo the root-store hashing every time.
static TLS_CONFIG: LazyLock<Arc<rustls::ClientConfig>> = LazyLock::new(|| {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
});

/// DNS over TLS (RFC 7858): TLS session, then the TCP framing.
pub struct TlsTransport {
    server_addr: SocketAddr,
    server_name: Arc<str>,
}

impl TlsTransport {
    pub fn new(server_addr: SocketAddr, server_name: Arc<str>) -> Self {
        Self {
            server_addr,
            server_name,
        }
    }
}

#[async_trait]
impl DnsTransport for TlsTransport {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, CoreError> {
        let server_name = ServerName::try_from(self.server_name.to_string())
            .map_err(|_| CoreError::InvalidUpstream(format!("bad SNI: {}", self.server_name)))?;

        let exchange = async {
            let tcp = TcpStream::connect(self.server_addr)
                .await
                .map_err(|e| CoreError::Io(format!("connect to {} failed: {e}", self.server_addr)))?;
            tcp.set_nodelay(true).ok();

            let connector = TlsConnector::from(Arc::clone(&TLS_CONFIG));
            let mut stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| CoreError::Io(format!("TLS handshake with {} failed: {e}", self.server_name)))?;

            framed_exchange(&mut stream, query).await
        };

        let response = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| CoreError::QueryTimeout)??;

        debug!(server = %self.server_addr, sni = %self.server_name, bytes = response.len(), "DoT response received");
        Ok(response)
    }

    fn protocol_name(&self) -> &'static str {
        "TLS"
    }
}
