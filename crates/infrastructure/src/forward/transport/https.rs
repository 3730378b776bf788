use super::DnsTransport;
use aegis_dns_domain::CoreError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Expected content type for DNS-over-HTTPS exchanges (RFC 8484 §6).
const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// Shared HTTP/2 client with connection pooling across every DoH upstream.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// DNS over HTTPS (RFC 8484), POST with a raw DNS message body.
///
/// `h3://` upstreams also land here for now: the shared client negotiates
/// HTTP/2 until an HTTP/3 client is wired in.
/// TODO: switch h3:// to a real HTTP/3 client once reqwest's http3 support
/// is stable.
pub struct HttpsTransport {
    url: String,
    /// Pre-resolved address, bypassing the system resolver so DoH hostnames
    /// go through the bootstrap set like every other upstream.
    resolved: Option<(String, SocketAddr)>,
    forced_h3: bool,
}

impl HttpsTransport {
    pub fn new(url: String, resolved: Option<(String, SocketAddr)>, forced_h3: bool) -> Self {
        if forced_h3 {
            warn!(url = %url, "h3:// upstream served over HTTP/2 until the HTTP/3 client lands");
        }
        Self {
            url,
            resolved,
            forced_h3,
        }
    }
}

#[async_trait]
impl DnsTransport for HttpsTransport {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, CoreError> {
        // A per-call client only when we must pin the resolved address; the
        // shared pooled client covers the common path.
        let response = if let Some((host, addr)) = &self.resolved {
            let client = reqwest::Client::builder()
                .use_rustls_tls()
                .resolve(host, *addr)
                .timeout(timeout)
                .build()
                .map_err(|e| CoreError::Io(format!("DoH client build failed: {e}")))?;
            client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
                .header(reqwest::header::ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
                .body(query.to_vec())
                .send()
                .await
        } else {
            tokio::time::timeout(
                timeout,
                SHARED_CLIENT
                    .post(&self.url)
                    .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
                    .header(reqwest::header::ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
                    .body(query.to_vec())
                    .send(),
            )
            .await
            .map_err(|_| CoreError::QueryTimeout)?
        }
        .map_err(|e| CoreError::Io(format!("DoH request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Io(format!(
                "DoH server {} returned HTTP {}",
                self.url,
                status.as_u16()
            )));
        }

        let bytes = tokio::time::timeout(timeout, response.bytes())
            .await
            .map_err(|_| CoreError::QueryTimeout)?
            .map_err(|e| CoreError::Io(format!("DoH read from {} failed: {e}", self.url)))?;

        debug!(url = %self.url, bytes = bytes.len(), h3 = self.forced_h3, "DoH response received");
        Ok(bytes.to_vec())
    }

    fn protocol_name(&self) -> &'static str {
        "HTTPS"
    }
}
