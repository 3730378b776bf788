use aegis_dns_domain::{ClientSource, RuntimeClient};
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::net::IpAddr;

/// Auto-discovered clients, keyed by IP. Display-only: runtime clients never
/// carry policy.
///
/// Sources have a fixed merge priority (hosts file < rDNS < ARP < WHOIS <
/// DHCP); a lower-priority discovery never overwrites a higher one's name.
pub struct RuntimeClients {
    table: DashMap<IpAddr, RuntimeClient, FxBuildHasher>,
}

impl RuntimeClients {
    pub fn new() -> Self {
        Self {
            table: DashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn observe(&self, ip: IpAddr, name: String, source: ClientSource) {
        if name.is_empty() {
            return;
        }
        match self.table.get_mut(&ip) {
            Some(mut existing) => {
                if source >= existing.source {
                    existing.name = name;
                    existing.source = source;
                }
            }
            None => {
                self.table.insert(ip, RuntimeClient { ip, name, source });
            }
        }
    }

    pub fn get(&self, ip: IpAddr) -> Option<RuntimeClient> {
        self.table.get(&ip).map(|entry| entry.clone())
    }

    pub fn all(&self) -> Vec<RuntimeClient> {
        self.table.iter().map(|entry| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for RuntimeClients {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "192.168.1.23".parse().unwrap()
    }

    #[test]
    fn higher_priority_source_wins() {
        let clients = RuntimeClients::new();
        clients.observe(ip(), "from-rdns".into(), ClientSource::Rdns);
        clients.observe(ip(), "from-dhcp".into(), ClientSource::Dhcp);
        assert_eq!(clients.get(ip()).unwrap().name, "from-dhcp");

        // A later, lower-priority sighting does not demote the name.
        clients.observe(ip(), "from-hosts".into(), ClientSource::HostsFile);
        assert_eq!(clients.get(ip()).unwrap().name, "from-dhcp");
    }

    #[test]
    fn same_source_refreshes_name() {
        let clients = RuntimeClients::new();
        clients.observe(ip(), "old".into(), ClientSource::Dhcp);
        clients.observe(ip(), "new".into(), ClientSource::Dhcp);
        assert_eq!(clients.get(ip()).unwrap().name, "new");
    }
}
