//! Domain-qualified upstream routing: `[/example.lan/] udp://192.168.1.1`
//! sends `example.lan` and everything under it to the router instead of the
//! default set. `[/example.lan/]#` restores the defaults for a sub-zone.

use super::upstream::Upstream;
use super::url;
use aegis_dns_domain::CoreError;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;
use std::sync::Arc;

/// One parsed config line.
#[derive(Debug)]
pub struct UpstreamSpec {
    /// `None` for unqualified default upstreams.
    pub domains: Option<Vec<String>>,
    /// Empty for the `#` default-restore marker.
    pub endpoint: Option<String>,
}

/// Split an upstream config line into its optional domain qualifier and the
/// endpoint (or `#`).
pub fn parse_spec(line: &str) -> Result<UpstreamSpec, CoreError> {
    let line = line.trim();

    let Some(rest) = line.strip_prefix("[/") else {
        return Ok(UpstreamSpec {
            domains: None,
            endpoint: Some(line.to_string()),
        });
    };

    let (domain_part, endpoint_part) = rest
        .split_once("/]")
        .ok_or_else(|| CoreError::InvalidUpstream(format!("unterminated domain spec: {line}")))?;

    let mut domains = Vec::new();
    for domain in domain_part.split('/') {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            continue;
        }
        validate_reverse_zone(&domain, line)?;
        domains.push(domain);
    }
    if domains.is_empty() {
        return Err(CoreError::InvalidUpstream(format!(
            "empty domain spec: {line}"
        )));
    }

    let endpoint = endpoint_part.trim();
    let endpoint = match endpoint {
        "#" => None,
        "" => {
            return Err(CoreError::InvalidUpstream(format!(
                "missing endpoint: {line}"
            )))
        }
        other => Some(other.to_string()),
    };

    Ok(UpstreamSpec {
        domains: Some(domains),
        endpoint,
    })
}

/// Reverse zones may only live under `in-addr.arpa` / `ip6.arpa`.
fn validate_reverse_zone(domain: &str, line: &str) -> Result<(), CoreError> {
    if domain == "arpa" || domain.ends_with(".arpa") {
        let valid = domain.ends_with("in-addr.arpa") || domain.ends_with("ip6.arpa");
        if !valid {
            return Err(CoreError::InvalidUpstream(format!(
                "bad reverse zone {domain} in {line}"
            )));
        }
    }
    Ok(())
}

/// What a suffix maps to.
pub enum DomainRoute {
    /// Explicitly routed back to the default set.
    Default,
    Upstreams(Vec<Arc<Upstream>>),
}

/// Longest-suffix-wins routing table.
pub struct DomainTable {
    routes: HashMap<String, DomainRoute, FxBuildHasher>,
}

impl DomainTable {
    pub fn new() -> Self {
        Self {
            routes: HashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn insert(&mut self, domain: String, route: DomainRoute) {
        self.routes.insert(domain, route);
    }

    /// The route for `name`, walking from the full name to shorter suffixes
    /// so the longest configured suffix wins.
    pub fn select(&self, name: &str) -> Option<&DomainRoute> {
        let mut suffix = name;
        loop {
            if let Some(route) = self.routes.get(suffix) {
                return Some(route);
            }
            match suffix.split_once('.') {
                Some((_, rest)) => suffix = rest,
                None => return None,
            }
        }
    }
}

impl Default for DomainTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the default set and the domain table out of config lines.
pub fn build_tables(
    lines: &[String],
) -> Result<(Vec<Arc<Upstream>>, DomainTable), CoreError> {
    let mut defaults: Vec<Arc<Upstream>> = Vec::new();
    let mut qualified: HashMap<String, Vec<Arc<Upstream>>> = HashMap::new();
    let mut restores: Vec<String> = Vec::new();

    for line in lines {
        let spec = parse_spec(line)?;
        match (spec.domains, spec.endpoint) {
            (None, Some(endpoint)) => {
                defaults.push(Arc::new(Upstream::new(url::parse(&endpoint)?)));
            }
            (Some(domains), Some(endpoint)) => {
                let upstream = Arc::new(Upstream::new(url::parse(&endpoint)?));
                for domain in domains {
                    qualified.entry(domain).or_default().push(Arc::clone(&upstream));
                }
            }
            (Some(domains), None) => restores.extend(domains),
            (None, None) => unreachable!("parse_spec yields an endpoint for bare lines"),
        }
    }

    if defaults.is_empty() {
        return Err(CoreError::InvalidConfig(
            "no unqualified default upstream configured".into(),
        ));
    }

    let mut table = DomainTable::new();
    for (domain, upstreams) in qualified {
        table.insert(domain, DomainRoute::Upstreams(upstreams));
    }
    for domain in restores {
        table.insert(domain, DomainRoute::Default);
    }

    Ok((defaults, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_line_is_default() {
        let spec = parse_spec("udp://9.9.9.9").unwrap();
        assert!(spec.domains.is_none());
    }

    #[test]
    fn qualified_line_parses_domains() {
        let spec = parse_spec("[/example.lan/other.lan/] udp://192.168.1.1").unwrap();
        assert_eq!(
            spec.domains.unwrap(),
            vec!["example.lan".to_string(), "other.lan".to_string()]
        );
        assert!(spec.endpoint.is_some());
    }

    #[test]
    fn hash_restores_default() {
        let spec = parse_spec("[/public.example.lan/]#").unwrap();
        assert!(spec.endpoint.is_none());
    }

    #[test]
    fn reverse_zone_validation() {
        assert!(parse_spec("[/168.192.in-addr.arpa/] udp://192.168.1.1").is_ok());
        assert!(parse_spec("[/d.f.ip6.arpa/] udp://192.168.1.1").is_ok());
        assert!(parse_spec("[/home.arpa/] udp://192.168.1.1").is_err());
    }

    #[test]
    fn longest_suffix_wins() {
        let lines = vec![
            "udp://9.9.9.9".to_string(),
            "[/example.lan/] udp://192.168.1.1".to_string(),
            "[/public.example.lan/]#".to_string(),
        ];
        let (defaults, table) = build_tables(&lines).unwrap();
        assert_eq!(defaults.len(), 1);

        assert!(matches!(
            table.select("nas.example.lan"),
            Some(DomainRoute::Upstreams(_))
        ));
        assert!(matches!(
            table.select("www.public.example.lan"),
            Some(DomainRoute::Default)
        ));
        assert!(table.select("example.com").is_none());
    }
}
