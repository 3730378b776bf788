use super::parser::HostsEntry;
use aegis_dns_application::ports::HostsViewPort;
use aegis_dns_domain::MacAddr;
use arc_swap::ArcSwap;
use ipnetwork::IpNetwork;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// One DHCP lease as pushed by the DHCP collaborator.
#[derive(Debug, Clone)]
pub struct DhcpLease {
    pub ip: IpAddr,
    pub hostname: String,
    pub mac: Option<MacAddr>,
}

/// Immutable index over one generation of bindings.
#[derive(Default)]
struct Snapshot {
    forward: HashMap<String, Vec<IpAddr>, FxBuildHasher>,
    reverse: HashMap<IpAddr, Vec<String>, FxBuildHasher>,
    macs: HashMap<IpAddr, MacAddr, FxBuildHasher>,
}

/// Read-only view of locally-known name↔IP bindings, fed by the hosts-file
/// watcher and the DHCP server.
///
/// Each source keeps its latest input; any update rebuilds the combined
/// snapshot and swaps it atomically, so in-flight requests keep the
/// generation they started with.
pub struct HostsView {
    snapshot: ArcSwap<Snapshot>,
    /// Appended to bare hostnames (e.g. `nas` → `nas.lan`).
    local_domain: String,
    /// Address ranges this view answers PTR queries for.
    local_ranges: Vec<IpNetwork>,
    inputs: std::sync::Mutex<Inputs>,
}

#[derive(Default)]
struct Inputs {
    hosts: Vec<HostsEntry>,
    leases: Vec<DhcpLease>,
}

impl HostsView {
    pub fn new(local_domain: impl Into<String>, local_ranges: Vec<IpNetwork>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            local_domain: local_domain.into(),
            local_ranges,
            inputs: std::sync::Mutex::new(Inputs::default()),
        }
    }

    /// Replace the hosts-file contribution (called on file modification).
    pub fn apply_hosts(&self, entries: Vec<HostsEntry>) {
        let snapshot = {
            let mut inputs = self.inputs.lock().unwrap();
            inputs.hosts = entries;
            self.rebuild(&inputs)
        };
        self.snapshot.store(Arc::new(snapshot));
        debug!("Hosts view: hosts-file snapshot swapped");
    }

    /// Replace the DHCP contribution (called on lease change).
    pub fn apply_leases(&self, leases: Vec<DhcpLease>) {
        let snapshot = {
            let mut inputs = self.inputs.lock().unwrap();
            inputs.leases = leases;
            self.rebuild(&inputs)
        };
        self.snapshot.store(Arc::new(snapshot));
        debug!("Hosts view: DHCP snapshot swapped");
    }

    /// MAC for `ip`, from the current lease table. The client resolver uses
    /// this for MAC-configured clients.
    pub fn mac_for(&self, ip: IpAddr) -> Option<MacAddr> {
        self.snapshot.load().macs.get(&ip).copied()
    }

    fn rebuild(&self, inputs: &Inputs) -> Snapshot {
        let mut snapshot = Snapshot::default();

        for entry in &inputs.hosts {
            for name in &entry.names {
                self.index(&mut snapshot, name, entry.ip);
            }
        }
        for lease in &inputs.leases {
            if !lease.hostname.is_empty() {
                self.index(&mut snapshot, &lease.hostname.to_ascii_lowercase(), lease.ip);
            }
            if let Some(mac) = lease.mac {
                snapshot.macs.insert(lease.ip, mac);
            }
        }

        snapshot
    }

    /// Index a name under both its bare and local-domain-qualified forms.
    fn index(&self, snapshot: &mut Snapshot, name: &str, ip: IpAddr) {
        let qualified = if name.contains('.') {
            name.to_string()
        } else {
            format!("{name}.{}", self.local_domain)
        };

        for key in [name.to_string(), qualified.clone()] {
            let ips = snapshot.forward.entry(key).or_default();
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }

        let names = snapshot.reverse.entry(ip).or_default();
        let fqdn = format!("{qualified}.");
        if !names.contains(&fqdn) {
            names.push(fqdn);
        }
    }
}

impl HostsViewPort for HostsView {
    fn lookup(&self, hostname: &str) -> Vec<IpAddr> {
        self.snapshot
            .load()
            .forward
            .get(hostname)
            .cloned()
            .unwrap_or_default()
    }

    fn reverse(&self, ip: IpAddr) -> Vec<String> {
        self.snapshot
            .load()
            .reverse
            .get(&ip)
            .cloned()
            .unwrap_or_default()
    }

    fn covers(&self, ip: IpAddr) -> bool {
        self.local_ranges.iter().any(|net| net.contains(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::parser::parse_hosts;

    fn view() -> HostsView {
        HostsView::new("lan", vec!["192.168.0.0/16".parse().unwrap()])
    }

    #[test]
    fn bare_names_gain_local_domain() {
        let v = view();
        v.apply_hosts(parse_hosts("192.168.1.10 nas"));
        let ip: IpAddr = "192.168.1.10".parse().unwrap();
        assert_eq!(v.lookup("nas"), vec![ip]);
        assert_eq!(v.lookup("nas.lan"), vec![ip]);
        assert_eq!(v.reverse(ip), vec!["nas.lan.".to_string()]);
    }

    #[test]
    fn lease_and_hosts_merge() {
        let v = view();
        v.apply_hosts(parse_hosts("192.168.1.10 nas"));
        v.apply_leases(vec![DhcpLease {
            ip: "192.168.1.20".parse().unwrap(),
            hostname: "printer".into(),
            mac: Some("aa:bb:cc:dd:ee:ff".parse().unwrap()),
        }]);

        assert!(!v.lookup("nas.lan").is_empty());
        assert!(!v.lookup("printer.lan").is_empty());
        assert!(v.mac_for("192.168.1.20".parse().unwrap()).is_some());
    }

    #[test]
    fn lease_swap_replaces_previous_generation() {
        let v = view();
        v.apply_leases(vec![DhcpLease {
            ip: "192.168.1.20".parse().unwrap(),
            hostname: "old".into(),
            mac: None,
        }]);
        v.apply_leases(vec![DhcpLease {
            ip: "192.168.1.21".parse().unwrap(),
            hostname: "new".into(),
            mac: None,
        }]);
        assert!(v.lookup("old.lan").is_empty());
        assert!(!v.lookup("new.lan").is_empty());
    }

    #[test]
    fn covers_only_configured_ranges() {
        let v = view();
        assert!(v.covers("192.168.5.5".parse().unwrap()));
        assert!(!v.covers("8.8.8.8".parse().unwrap()));
    }
}
