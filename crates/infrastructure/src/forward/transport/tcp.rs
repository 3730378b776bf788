use super::DnsTransport;
use aegis_dns_domain::CoreError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Plain DNS over TCP with the RFC 1035 two-byte length prefix.
pub struct TcpTransport {
    server_addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self { server_addr }
    }
}

/// Write `query` length-prefixed, read one length-prefixed response.
pub(super) async fn framed_exchange<S>(stream: &mut S, query: &[u8]) -> Result<Vec<u8>, CoreError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let len = u16::try_from(query.len())
        .map_err(|_| CoreError::WireFormat("query exceeds 64KiB".into()))?;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| CoreError::Io(format!("write failed: {e}")))?;
    stream
        .write_all(query)
        .await
        .map_err(|e| CoreError::Io(format!("write failed: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| CoreError::Io(format!("flush failed: {e}")))?;

    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| CoreError::Io(format!("read failed: {e}")))?;
    let response_len = u16::from_be_bytes(len_buf) as usize;

    let mut response = vec![0u8; response_len];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| CoreError::Io(format!("read failed: {e}")))?;
    Ok(response)
}

#[async_trait]
impl DnsTransport for TcpTransport {
    async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, CoreError> {
        let exchange = async {
            let mut stream = TcpStream::connect(self.server_addr)
                .await
                .map_err(|e| CoreError::Io(format!("connect to {} failed: {e}", self.server_addr)))?;
            stream.set_nodelay(true).ok();
            framed_exchange(&mut stream, query).await
        };

        let response = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| CoreError::QueryTimeout)??;

        debug!(server = %self.server_addr, bytes = response.len(), "TCP response received");
        Ok(response)
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }
}
