use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// One configured rule list source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterListSpec {
    /// Stable id; assigned monotonically, never reused.
    pub id: i64,
    /// URL or local path.
    pub source: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Display name; replaced by a `! Title:` header when the list has one.
    #[serde(default)]
    pub name: String,
}

/// Safe-browsing / parental reputation lookup configuration. Both features
/// share the shape; each gets its own instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeBrowsingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Reputation source queried with hash prefixes.
    #[serde(default)]
    pub endpoint: String,
    /// Positive and negative verdicts are cached this long, seconds.
    #[serde(default = "default_reputation_cache_secs")]
    pub cache_secs: u64,
}

impl Default for SafeBrowsingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            cache_secs: default_reputation_cache_secs(),
        }
    }
}

/// Filtering configuration: lists, user rules, safe-* features, sinkhole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub lists: Vec<FilterListSpec>,

    #[serde(default)]
    pub user_rules: Vec<String>,

    /// Minutes between refresh eligibility for each list.
    #[serde(default = "default_update_interval_mins")]
    pub update_interval_mins: u64,

    #[serde(default)]
    pub safebrowsing: SafeBrowsingConfig,
    #[serde(default)]
    pub parental: SafeBrowsingConfig,
    #[serde(default)]
    pub safesearch_enabled: bool,

    /// Services blocked for every client; per-client sets union with this.
    #[serde(default)]
    pub blocked_services: Vec<String>,

    #[serde(default = "default_sinkhole_v4")]
    pub sinkhole_v4: Ipv4Addr,
    #[serde(default = "default_sinkhole_v6")]
    pub sinkhole_v6: Ipv6Addr,

    /// Address blocked safebrowsing/parental answers point at.
    #[serde(default)]
    pub safe_sinkhole: Option<IpAddr>,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lists: vec![],
            user_rules: vec![],
            update_interval_mins: default_update_interval_mins(),
            safebrowsing: SafeBrowsingConfig::default(),
            parental: SafeBrowsingConfig::default(),
            safesearch_enabled: false,
            blocked_services: vec![],
            sinkhole_v4: default_sinkhole_v4(),
            sinkhole_v6: default_sinkhole_v6(),
            safe_sinkhole: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_update_interval_mins() -> u64 {
    30
}

fn default_reputation_cache_secs() -> u64 {
    3600
}

fn default_sinkhole_v4() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_sinkhole_v6() -> Ipv6Addr {
    Ipv6Addr::UNSPECIFIED
}
