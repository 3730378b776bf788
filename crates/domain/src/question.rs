use crate::record_type::RecordType;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Transport a query arrived on. Determines how access denials are delivered
/// and where a ClientID may be carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proto {
    Udp,
    Tcp,
    Tls,
    Https,
    Quic,
    DnsCrypt,
}

impl Proto {
    /// Encrypted transports drop denied queries instead of answering REFUSED.
    pub fn is_encrypted(self) -> bool {
        !matches!(self, Self::Udp | Self::Tcp)
    }
}

impl std::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "dot"),
            Self::Https => write!(f, "doh"),
            Self::Quic => write!(f, "doq"),
            Self::DnsCrypt => write!(f, "dnscrypt"),
        }
    }
}

/// Where a request came from, as reported by the listener that accepted it.
///
/// `server_name` is the TLS SNI for DoT/DoH/DoQ; `http_path` is the request
/// path for DoH. Both feed ClientID extraction.
#[derive(Debug, Clone)]
pub struct QueryOrigin {
    pub addr: SocketAddr,
    pub proto: Proto,
    pub server_name: Option<Arc<str>>,
    pub http_path: Option<Arc<str>>,
}

impl QueryOrigin {
    pub fn plain(addr: SocketAddr, proto: Proto) -> Self {
        Self {
            addr,
            proto,
            server_name: None,
            http_path: None,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }
}

/// A single DNS question, name already lowercased and stripped of the
/// trailing dot. `Arc<str>` keeps clones free across pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: Arc<str>,
    pub qtype: RecordType,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: impl AsRef<str>, qtype: RecordType) -> Self {
        let raw = name.as_ref();
        let trimmed = raw.strip_suffix('.').unwrap_or(raw);
        Self {
            name: Arc::from(trimmed.to_ascii_lowercase().as_str()),
            qtype,
            qclass: 1,
        }
    }

    pub fn with_class(mut self, qclass: u16) -> Self {
        self.qclass = qclass;
        self
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.qtype)
    }
}

/// Cache key and query-log correlation key.
///
/// Two requests share a fingerprint only when every dimension that can change
/// the answer matches: question, client identity, and any forwarded EDNS
/// client subnet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint {
    pub name: Arc<str>,
    pub qtype: RecordType,
    pub qclass: u16,
    pub client_key: Option<Arc<str>>,
    pub subnet: Option<(IpAddr, u8)>,
}

impl RequestFingerprint {
    pub fn new(question: &Question, client_key: Option<Arc<str>>) -> Self {
        Self {
            name: Arc::clone(&question.name),
            qtype: question.qtype,
            qclass: question.qclass,
            client_key,
            subnet: None,
        }
    }

    pub fn with_subnet(mut self, subnet: Option<(IpAddr, u8)>) -> Self {
        self.subnet = subnet;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_normalizes_name() {
        let q = Question::new("WWW.Example.COM.", RecordType::A);
        assert_eq!(&*q.name, "www.example.com");
    }

    #[test]
    fn fingerprint_distinguishes_clients() {
        let q = Question::new("example.com", RecordType::A);
        let anon = RequestFingerprint::new(&q, None);
        let kid = RequestFingerprint::new(&q, Some(Arc::from("kid-tv")));
        assert_ne!(anon, kid);
    }
}
