use super::clientid;
use crate::hosts::HostsView;
use aegis_dns_application::ports::ClientResolverPort;
use aegis_dns_domain::{ClientPolicy, MacAddr, PersistentClient, QueryOrigin};
use arc_swap::ArcSwap;
use ipnetwork::IpNetwork;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Global defaults a resolved policy starts from.
#[derive(Debug, Clone)]
pub struct PolicyDefaults {
    pub filtering: bool,
    pub safesearch: bool,
    pub safebrowsing: bool,
    pub parental: bool,
    pub blocked_services: Arc<[String]>,
}

/// Index over the configured client table. Rebuilt wholesale on config
/// apply and swapped atomically.
struct ClientTable {
    clients: Vec<PersistentClient>,
    by_id: HashMap<String, usize, FxBuildHasher>,
    by_ip: HashMap<IpAddr, usize, FxBuildHasher>,
    /// Sorted by prefix length descending so the first hit is the longest.
    subnets: Vec<(IpNetwork, usize)>,
    by_mac: HashMap<MacAddr, usize, FxBuildHasher>,
    by_name: HashMap<String, usize, FxBuildHasher>,
}

impl ClientTable {
    fn build(clients: Vec<PersistentClient>) -> Self {
        let mut by_id = HashMap::with_hasher(FxBuildHasher);
        let mut by_ip = HashMap::with_hasher(FxBuildHasher);
        let mut subnets = Vec::new();
        let mut by_mac = HashMap::with_hasher(FxBuildHasher);
        let mut by_name = HashMap::with_hasher(FxBuildHasher);

        for (idx, client) in clients.iter().enumerate() {
            for id in &client.ids {
                by_id.insert(id.to_ascii_lowercase(), idx);
            }
            for ip in &client.ips {
                by_ip.insert(*ip, idx);
            }
            for net in &client.subnets {
                subnets.push((*net, idx));
            }
            for mac in &client.macs {
                by_mac.insert(*mac, idx);
            }
            by_name.insert(client.name.to_ascii_lowercase(), idx);
        }

        subnets.sort_by(|a, b| b.0.prefix().cmp(&a.0.prefix()));

        Self {
            clients,
            by_id,
            by_ip,
            subnets,
            by_mac,
            by_name,
        }
    }
}

/// Maps request origins to client policies.
///
/// Matching order, first hit wins: ClientID exact → configured IP →
/// configured CIDR (longest prefix) → MAC learned from the lease table →
/// discovered-hostname match → anonymous defaults.
pub struct ClientResolver {
    table: ArcSwap<ClientTable>,
    defaults: ArcSwap<PolicyDefaults>,
    hosts: Arc<HostsView>,
}

impl ClientResolver {
    pub fn new(
        clients: Vec<PersistentClient>,
        defaults: PolicyDefaults,
        hosts: Arc<HostsView>,
    ) -> Self {
        Self {
            table: ArcSwap::from_pointee(ClientTable::build(clients)),
            defaults: ArcSwap::from_pointee(defaults),
            hosts,
        }
    }

    /// Swap in a new client table and defaults (config apply).
    pub fn update(&self, clients: Vec<PersistentClient>, defaults: PolicyDefaults) {
        self.table.store(Arc::new(ClientTable::build(clients)));
        self.defaults.store(Arc::new(defaults));
    }

    fn find<'a>(&self, table: &'a ClientTable, origin: &QueryOrigin) -> Option<&'a PersistentClient> {
        if let Some(id) = clientid::extract(origin) {
            if let Some(&idx) = table.by_id.get(&id) {
                return Some(&table.clients[idx]);
            }
        }

        let ip = origin.ip();
        if let Some(&idx) = table.by_ip.get(&ip) {
            return Some(&table.clients[idx]);
        }

        for (net, idx) in &table.subnets {
            if net.contains(ip) {
                return Some(&table.clients[*idx]);
            }
        }

        if let Some(mac) = self.hosts.mac_for(ip) {
            if let Some(&idx) = table.by_mac.get(&mac) {
                return Some(&table.clients[idx]);
            }
        }

        // Last resort: a discovered hostname for the IP equals a configured
        // client name.
        for name in self.hosts.reverse(ip) {
            let bare = name
                .trim_end_matches('.')
                .split('.')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();
            if let Some(&idx) = table.by_name.get(&bare) {
                return Some(&table.clients[idx]);
            }
        }

        None
    }

    /// Overlay a client's overrides onto the global defaults.
    fn compose(&self, client: &PersistentClient, ip: IpAddr) -> ClientPolicy {
        let defaults = self.defaults.load();
        let name: Arc<str> = Arc::from(client.name.as_str());

        // Blocked services union with the global set.
        let mut services: Vec<String> = defaults.blocked_services.to_vec();
        for service in &client.blocked_services {
            if !services.iter().any(|s| s == service) {
                services.push(service.clone());
            }
        }

        ClientPolicy {
            key: Some(Arc::clone(&name)),
            name: Some(name),
            ip,
            tags: Arc::from(client.tags.clone()),
            filtering: client.filtering.unwrap_or(defaults.filtering),
            safesearch: client.safesearch.unwrap_or(defaults.safesearch),
            safebrowsing: client.safebrowsing.unwrap_or(defaults.safebrowsing),
            parental: client.parental.unwrap_or(defaults.parental),
            upstreams: if client.upstreams.is_empty() {
                None
            } else {
                Some(Arc::from(client.upstreams.clone()))
            },
            blocked_services: Arc::from(services),
        }
    }
}

impl ClientResolverPort for ClientResolver {
    fn resolve(&self, origin: &QueryOrigin) -> ClientPolicy {
        let table = self.table.load();
        match self.find(&table, origin) {
            Some(client) => self.compose(client, origin.ip()),
            None => {
                let d = self.defaults.load();
                ClientPolicy::anonymous(
                    origin.ip(),
                    d.filtering,
                    d.safesearch,
                    d.safebrowsing,
                    d.parental,
                    Arc::clone(&d.blocked_services),
                )
            }
        }
    }

    fn extract_client_id(&self, origin: &QueryOrigin) -> Option<String> {
        clientid::extract(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_dns_domain::Proto;

    fn hosts() -> Arc<HostsView> {
        Arc::new(HostsView::new("lan", vec![]))
    }

    fn defaults() -> PolicyDefaults {
        PolicyDefaults {
            filtering: true,
            safesearch: false,
            safebrowsing: false,
            parental: false,
            blocked_services: Arc::from(vec!["tiktok".to_string()]),
        }
    }

    fn client(name: &str) -> PersistentClient {
        PersistentClient {
            name: name.into(),
            ids: vec![],
            ips: vec![],
            subnets: vec![],
            macs: vec![],
            tags: vec![],
            filtering: None,
            safesearch: None,
            safebrowsing: None,
            parental: None,
            upstreams: vec![],
            blocked_services: vec![],
        }
    }

    fn origin(ip: &str) -> QueryOrigin {
        QueryOrigin::plain(format!("{ip}:40000").parse().unwrap(), Proto::Udp)
    }

    #[test]
    fn clientid_beats_ip() {
        let mut by_ip = client("by-ip");
        by_ip.ips = vec!["10.0.0.9".parse().unwrap()];
        let mut by_id = client("by-id");
        by_id.ids = vec!["kid-tv".into()];

        let resolver = ClientResolver::new(vec![by_ip, by_id], defaults(), hosts());

        let mut o = origin("10.0.0.9");
        o.proto = Proto::Tls;
        o.server_name = Some(Arc::from("kid-tv.dns.example"));

        let policy = resolver.resolve(&o);
        assert_eq!(policy.name.as_deref(), Some("by-id"));
    }

    #[test]
    fn longest_cidr_wins() {
        let mut wide = client("wide");
        wide.subnets = vec!["10.0.0.0/8".parse().unwrap()];
        let mut narrow = client("narrow");
        narrow.subnets = vec!["10.0.0.0/24".parse().unwrap()];

        let resolver = ClientResolver::new(vec![wide, narrow], defaults(), hosts());
        let policy = resolver.resolve(&origin("10.0.0.77"));
        assert_eq!(policy.name.as_deref(), Some("narrow"));
    }

    #[test]
    fn overrides_compose_with_defaults() {
        let mut kid = client("kid-tv");
        kid.ips = vec!["10.0.0.5".parse().unwrap()];
        kid.filtering = Some(false);
        kid.blocked_services = vec!["youtube".into()];

        let resolver = ClientResolver::new(vec![kid], defaults(), hosts());
        let policy = resolver.resolve(&origin("10.0.0.5"));

        assert!(!policy.filtering);
        // Union: global tiktok plus per-client youtube.
        assert!(policy.blocked_services.iter().any(|s| s == "tiktok"));
        assert!(policy.blocked_services.iter().any(|s| s == "youtube"));
        assert!(policy.upstreams.is_none());
    }

    #[test]
    fn anonymous_gets_global_policy() {
        let resolver = ClientResolver::new(vec![], defaults(), hosts());
        let policy = resolver.resolve(&origin("203.0.113.5"));
        assert!(policy.name.is_none());
        assert!(policy.filtering);
        assert_eq!(policy.blocked_services.len(), 1);
    }
}
