use std::net::IpAddr;

/// Read-only snapshot of locally-known name↔address bindings (hosts files
/// plus DHCP leases). Swapped wholesale by its owners.
pub trait HostsViewPort: Send + Sync {
    fn lookup(&self, hostname: &str) -> Vec<IpAddr>;

    /// Hostnames for `ip`, each with the trailing dot PTR answers need.
    fn reverse(&self, ip: IpAddr) -> Vec<String>;

    /// True when `ip` falls inside a range this view is authoritative for.
    fn covers(&self, ip: IpAddr) -> bool;
}
