//! Upstream endpoint parsing.
//!
//! Accepted forms: `udp://h:p`, `tcp://h:p`, `tls://h:p`, `https://h:p/path`,
//! `h3://h:p/path`, `quic://h:p`, `sdns://…` stamps, and bare `ip[:port]`
//! (plain UDP with TCP fallback).

use aegis_dns_domain::CoreError;
use base64::Engine as _;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Udp,
    Tcp,
    Tls,
    Https,
    /// DoH with HTTP/3 forced.
    H3,
    Quic,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Self::Udp | Self::Tcp => 53,
            Self::Tls | Self::Quic => 853,
            Self::Https | Self::H3 => 443,
        }
    }
}

/// One parsed upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamUrl {
    pub scheme: Scheme,
    /// Hostname or IP literal, without brackets.
    pub host: String,
    pub port: u16,
    /// DoH request path, `/dns-query` unless the URL carries one.
    pub path: String,
    /// The configured form, for logs and the query log.
    pub display: Arc<str>,
}

impl UpstreamUrl {
    pub fn host_is_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// DoH URL for the reqwest transport.
    pub fn https_url(&self) -> String {
        format!("https://{}:{}{}", self.host, self.port, self.path)
    }
}

pub fn parse(input: &str) -> Result<UpstreamUrl, CoreError> {
    let input = input.trim();
    let display: Arc<str> = Arc::from(input);

    if let Some(stamp) = input.strip_prefix("sdns://") {
        return parse_stamp(stamp, display);
    }

    let (scheme, rest) = match input.split_once("://") {
        Some(("udp", rest)) => (Scheme::Udp, rest),
        Some(("tcp", rest)) => (Scheme::Tcp, rest),
        Some(("tls", rest)) => (Scheme::Tls, rest),
        Some(("https", rest)) => (Scheme::Https, rest),
        Some(("h3", rest)) => (Scheme::H3, rest),
        Some(("quic", rest)) => (Scheme::Quic, rest),
        Some((other, _)) => {
            return Err(CoreError::InvalidUpstream(format!(
                "unknown scheme {other}://"
            )))
        }
        // Bare address: plain DNS.
        None => (Scheme::Udp, input),
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(CoreError::InvalidUpstream(format!("empty host in {input}")));
    }

    let (host, port) = split_host_port(authority, scheme.default_port())?;

    let path = match scheme {
        Scheme::Https | Scheme::H3 => {
            if path.is_empty() {
                "/dns-query".to_string()
            } else {
                path.to_string()
            }
        }
        _ => {
            if !path.is_empty() {
                return Err(CoreError::InvalidUpstream(format!(
                    "{input}: path is only valid for https/h3"
                )));
            }
            String::new()
        }
    };

    Ok(UpstreamUrl {
        scheme,
        host,
        port,
        path,
        display,
    })
}

/// `host:port`, `[v6]:port`, bare `host`, bare `v6`.
fn split_host_port(authority: &str, default_port: u16) -> Result<(String, u16), CoreError> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| CoreError::InvalidUpstream(format!("bad address: {authority}")))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p
                .parse()
                .map_err(|_| CoreError::InvalidUpstream(format!("bad port: {authority}")))?,
            None => default_port,
        };
        return Ok((host.to_string(), port));
    }

    // A bare IPv6 literal has multiple colons and no brackets.
    if authority.matches(':').count() > 1 {
        if authority.parse::<IpAddr>().is_ok() {
            return Ok((authority.to_string(), default_port));
        }
        return Err(CoreError::InvalidUpstream(format!(
            "bad address: {authority}"
        )));
    }

    match authority.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| CoreError::InvalidUpstream(format!("bad port: {authority}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), default_port)),
    }
}

// ---------------------------------------------------------------------------
// DNS stamps (sdns://)
// ---------------------------------------------------------------------------

const STAMP_PLAIN: u8 = 0x00;
const STAMP_DNSCRYPT: u8 = 0x01;
const STAMP_DOH: u8 = 0x02;
const STAMP_DOT: u8 = 0x03;
const STAMP_DOQ: u8 = 0x04;

/// Decode a DNS stamp. Plain, DoH, DoT, and DoQ stamps map onto the matching
/// transport; DNSCrypt proper needs its own cipher suite and is rejected.
fn parse_stamp(encoded: &str, display: Arc<str>) -> Result<UpstreamUrl, CoreError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| CoreError::InvalidUpstream("bad stamp encoding".into()))?;

    let mut r = StampReader::new(&bytes);
    let kind = r.u8()?;

    // 8 bytes of informal properties flags.
    r.skip(8)?;

    match kind {
        STAMP_PLAIN => {
            let addr = r.lp_str()?;
            let (host, port) = split_host_port(&addr, 53)?;
            Ok(UpstreamUrl {
                scheme: Scheme::Udp,
                host,
                port,
                path: String::new(),
                display,
            })
        }
        STAMP_DOH => {
            let _addr = r.lp_str()?;
            r.skip_vlp()?; // hashes
            let hostname = r.lp_str()?;
            let path = r.lp_str()?;
            let (host, port) = split_host_port(&hostname, 443)?;
            Ok(UpstreamUrl {
                scheme: Scheme::Https,
                host,
                port,
                path: if path.is_empty() { "/dns-query".into() } else { path },
                display,
            })
        }
        STAMP_DOT | STAMP_DOQ => {
            let _addr = r.lp_str()?;
            r.skip_vlp()?; // hashes
            let hostname = r.lp_str()?;
            let scheme = if kind == STAMP_DOT { Scheme::Tls } else { Scheme::Quic };
            let (host, port) = split_host_port(&hostname, scheme.default_port())?;
            Ok(UpstreamUrl {
                scheme,
                host,
                port,
                path: String::new(),
                display,
            })
        }
        STAMP_DNSCRYPT => Err(CoreError::InvalidUpstream(
            "DNSCrypt stamps are not supported; use a DoH/DoT/DoQ stamp".into(),
        )),
        other => Err(CoreError::InvalidUpstream(format!(
            "unknown stamp type 0x{other:02x}"
        ))),
    }
}

struct StampReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> StampReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, CoreError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| CoreError::InvalidUpstream("truncated stamp".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn skip(&mut self, n: usize) -> Result<(), CoreError> {
        if self.pos + n > self.bytes.len() {
            return Err(CoreError::InvalidUpstream("truncated stamp".into()));
        }
        self.pos += n;
        Ok(())
    }

    /// Length-prefixed string.
    fn lp_str(&mut self) -> Result<String, CoreError> {
        let len = self.u8()? as usize;
        if self.pos + len > self.bytes.len() {
            return Err(CoreError::InvalidUpstream("truncated stamp".into()));
        }
        let s = String::from_utf8_lossy(&self.bytes[self.pos..self.pos + len]).into_owned();
        self.pos += len;
        Ok(s)
    }

    /// Variable-count length-prefixed set: the high bit marks continuation.
    fn skip_vlp(&mut self) -> Result<(), CoreError> {
        loop {
            let len = self.u8()?;
            self.skip((len & 0x7f) as usize)?;
            if len & 0x80 == 0 {
                return Ok(());
            }
        }
    }
}
