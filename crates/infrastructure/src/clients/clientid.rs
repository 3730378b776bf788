//! ClientID extraction from transport metadata.
//!
//! DoT and DoQ carry the id as the leading SNI label; DoH prefers the URL
//! path component after the well-known prefix and falls back to the SNI only
//! when the path has none. Comparison elsewhere is case-insensitive; ids are
//! normalized to lowercase here.

use aegis_dns_domain::{Proto, QueryOrigin};

/// Well-known DoH path prefix; a trailing component is the ClientID:
/// `/dns-query/bob` → `bob`.
const DOH_PATH_PREFIX: &str = "/dns-query";

pub fn extract(origin: &QueryOrigin) -> Option<String> {
    match origin.proto {
        Proto::Tls | Proto::Quic => sni_label(origin.server_name.as_deref()),
        Proto::Https => {
            path_component(origin.http_path.as_deref())
                .or_else(|| sni_label(origin.server_name.as_deref()))
        }
        Proto::Udp | Proto::Tcp | Proto::DnsCrypt => None,
    }
}

fn sni_label(server_name: Option<&str>) -> Option<String> {
    let sni = server_name?;
    let label = sni.split('.').next()?;
    validate(label)
}

fn path_component(path: Option<&str>) -> Option<String> {
    let path = path?;
    let rest = path.strip_prefix(DOH_PATH_PREFIX)?;
    let candidate = rest.trim_matches('/');
    if candidate.is_empty() || candidate.contains('/') {
        return None;
    }
    validate(candidate)
}

/// ClientIDs are short DNS-label-shaped tokens.
fn validate(candidate: &str) -> Option<String> {
    if candidate.is_empty() || candidate.len() > 64 {
        return None;
    }
    if !candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return None;
    }
    Some(candidate.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn origin(proto: Proto, sni: Option<&str>, path: Option<&str>) -> QueryOrigin {
        QueryOrigin {
            addr: "192.0.2.1:50000".parse().unwrap(),
            proto,
            server_name: sni.map(Arc::from),
            http_path: path.map(Arc::from),
        }
    }

    #[test]
    fn dot_uses_sni_label() {
        let o = origin(Proto::Tls, Some("alice.dns.example"), None);
        assert_eq!(extract(&o).as_deref(), Some("alice"));
    }

    #[test]
    fn doh_path_wins_over_sni() {
        let o = origin(
            Proto::Https,
            Some("alice.dns.example"),
            Some("/dns-query/bob"),
        );
        assert_eq!(extract(&o).as_deref(), Some("bob"));
    }

    #[test]
    fn doh_falls_back_to_sni_without_path_component() {
        let o = origin(Proto::Https, Some("alice.dns.example"), Some("/dns-query"));
        assert_eq!(extract(&o).as_deref(), Some("alice"));
    }

    #[test]
    fn plain_transports_carry_no_id() {
        let o = origin(Proto::Udp, None, None);
        assert_eq!(extract(&o), None);
    }

    #[test]
    fn ids_normalize_to_lowercase() {
        let o = origin(Proto::Quic, Some("Kid-TV.dns.example"), None);
        assert_eq!(extract(&o).as_deref(), Some("kid-tv"));
    }

    #[test]
    fn invalid_characters_rejected() {
        let o = origin(Proto::Https, None, Some("/dns-query/bad_id!"));
        assert_eq!(extract(&o), None);
    }
}
