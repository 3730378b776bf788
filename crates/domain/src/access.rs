use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Global access control, applied before any other processing.
///
/// Semantics follow the usual allowlist-wins model: when the allowed set is
/// non-empty, only origins matching it are served and the blocked set is
/// ignored; otherwise any origin matching the blocked set is refused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessList {
    #[serde(default)]
    pub allowed_ips: Vec<IpAddr>,
    #[serde(default)]
    pub allowed_subnets: Vec<IpNetwork>,
    #[serde(default)]
    pub allowed_client_ids: Vec<String>,

    #[serde(default)]
    pub blocked_ips: Vec<IpAddr>,
    #[serde(default)]
    pub blocked_subnets: Vec<IpNetwork>,
    #[serde(default)]
    pub blocked_client_ids: Vec<String>,
}

impl AccessList {
    fn allow_configured(&self) -> bool {
        !self.allowed_ips.is_empty()
            || !self.allowed_subnets.is_empty()
            || !self.allowed_client_ids.is_empty()
    }

    fn in_allow(&self, ip: IpAddr, client_id: Option<&str>) -> bool {
        if self.allowed_ips.contains(&ip) {
            return true;
        }
        if self.allowed_subnets.iter().any(|net| net.contains(ip)) {
            return true;
        }
        match client_id {
            Some(id) => self
                .allowed_client_ids
                .iter()
                .any(|c| c.eq_ignore_ascii_case(id)),
            None => false,
        }
    }

    fn in_block(&self, ip: IpAddr, client_id: Option<&str>) -> bool {
        if self.blocked_ips.contains(&ip) {
            return true;
        }
        if self.blocked_subnets.iter().any(|net| net.contains(ip)) {
            return true;
        }
        match client_id {
            Some(id) => self
                .blocked_client_ids
                .iter()
                .any(|c| c.eq_ignore_ascii_case(id)),
            None => false,
        }
    }

    /// True when a request from `ip` (with optional ClientID) may proceed.
    pub fn permits(&self, ip: IpAddr, client_id: Option<&str>) -> bool {
        if self.allow_configured() {
            self.in_allow(ip, client_id)
        } else {
            !self.in_block(ip, client_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn empty_list_permits_everyone() {
        let acl = AccessList::default();
        assert!(acl.permits(ip("10.0.0.1"), None));
    }

    #[test]
    fn blocklist_refuses_matches() {
        let acl = AccessList {
            blocked_subnets: vec!["192.168.9.0/24".parse().unwrap()],
            blocked_client_ids: vec!["spammer".into()],
            ..Default::default()
        };
        assert!(!acl.permits(ip("192.168.9.7"), None));
        assert!(!acl.permits(ip("10.0.0.1"), Some("Spammer")));
        assert!(acl.permits(ip("10.0.0.1"), Some("fine")));
    }

    #[test]
    fn allowlist_wins_over_blocklist() {
        let acl = AccessList {
            allowed_ips: vec![ip("10.0.0.5")],
            blocked_ips: vec![ip("10.0.0.5")],
            ..Default::default()
        };
        assert!(acl.permits(ip("10.0.0.5"), None));
        assert!(!acl.permits(ip("10.0.0.6"), None));
    }
}
