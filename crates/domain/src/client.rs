use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::CoreError;

/// A MAC address as learned from DHCP leases or configured on a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl FromStr for MacAddr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut count = 0;
        for part in s.split([':', '-']) {
            if count == 6 {
                return Err(CoreError::InvalidConfig(format!("bad MAC: {s}")));
            }
            bytes[count] = u8::from_str_radix(part, 16)
                .map_err(|_| CoreError::InvalidConfig(format!("bad MAC: {s}")))?;
            count += 1;
        }
        if count != 6 {
            return Err(CoreError::InvalidConfig(format!("bad MAC: {s}")));
        }
        Ok(MacAddr(bytes))
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A client configured by the administrator. Carries policy overrides; any
/// field left `None` inherits the global setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentClient {
    pub name: String,

    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
    #[serde(default)]
    pub subnets: Vec<IpNetwork>,
    #[serde(default)]
    pub macs: Vec<MacAddr>,
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub filtering: Option<bool>,
    #[serde(default)]
    pub safesearch: Option<bool>,
    #[serde(default)]
    pub safebrowsing: Option<bool>,
    #[serde(default)]
    pub parental: Option<bool>,

    /// Non-empty set fully replaces the global upstreams for this client.
    #[serde(default)]
    pub upstreams: Vec<String>,
    /// Unioned with the globally blocked services.
    #[serde(default)]
    pub blocked_services: Vec<String>,
}

/// Where a runtime (auto-discovered) client was learned from. Ordering is the
/// merge priority: a DHCP lease name beats an ARP entry for the same IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSource {
    HostsFile,
    Rdns,
    Arp,
    Whois,
    Dhcp,
}

/// An auto-discovered client. Displayed, never carries policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeClient {
    pub ip: IpAddr,
    pub name: String,
    pub source: ClientSource,
}

/// The effective policy attached to one request after client resolution.
///
/// Built by overlaying a persistent client's overrides onto the global
/// settings; anonymous requests get the globals verbatim.
#[derive(Debug, Clone)]
pub struct ClientPolicy {
    /// Persistent-client name, if the origin matched one.
    pub name: Option<Arc<str>>,
    /// Identity key used in the request fingerprint. Matches `name` for
    /// persistent clients, `None` for anonymous ones.
    pub key: Option<Arc<str>>,
    pub ip: IpAddr,
    pub tags: Arc<[String]>,

    pub filtering: bool,
    pub safesearch: bool,
    pub safebrowsing: bool,
    pub parental: bool,

    /// `Some` replaces the global upstream set for this request.
    pub upstreams: Option<Arc<[String]>>,
    pub blocked_services: Arc<[String]>,
}

impl ClientPolicy {
    /// The anonymous default policy for an unrecognized origin.
    pub fn anonymous(
        ip: IpAddr,
        filtering: bool,
        safesearch: bool,
        safebrowsing: bool,
        parental: bool,
        blocked_services: Arc<[String]>,
    ) -> Self {
        Self {
            name: None,
            key: None,
            ip,
            tags: Arc::from(Vec::new()),
            filtering,
            safesearch,
            safebrowsing,
            parental,
            upstreams: None,
            blocked_services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_parse_and_display() {
        let mac: MacAddr = "AA:bb:00:11:22:33".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:00:11:22:33");
        assert!("aa:bb:cc".parse::<MacAddr>().is_err());
        assert!("aa-bb-00-11-22-33".parse::<MacAddr>().is_ok());
    }

    #[test]
    fn client_source_priority() {
        assert!(ClientSource::Dhcp > ClientSource::Arp);
        assert!(ClientSource::Arp > ClientSource::Rdns);
        assert!(ClientSource::Rdns > ClientSource::HostsFile);
    }
}
