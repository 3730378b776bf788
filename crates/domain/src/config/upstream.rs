use crate::errors::CoreError;
use serde::{Deserialize, Serialize};

/// Upstream selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamMode {
    /// One upstream per query, weighted by observed RTT.
    #[default]
    LoadBalance,
    /// Fan out to every upstream, first success wins.
    ParallelAll,
    /// Fan out, then pick the answer whose address probes fastest.
    FastestIp,
}

/// Upstream resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Endpoint URLs, optionally domain-qualified: `[/example.lan/] udp://…`.
    #[serde(default = "default_upstreams")]
    pub upstreams: Vec<String>,

    /// Plain resolvers used only to resolve upstream hostnames.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: Vec<String>,

    #[serde(default)]
    pub mode: UpstreamMode,

    /// Per-upstream-call timeout, milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Window the fastest-ip mode waits for address probes, milliseconds.
    #[serde(default = "default_probe_window_ms")]
    pub probe_window_ms: u64,

    /// When set, attach EDNS client subnet with this prefix length
    /// (IPv4; IPv6 uses `edns_subnet_prefix_v6`).
    #[serde(default)]
    pub edns_client_subnet: bool,
    #[serde(default = "default_ecs_v4")]
    pub edns_subnet_prefix_v4: u8,
    #[serde(default = "default_ecs_v6")]
    pub edns_subnet_prefix_v6: u8,
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.upstreams.is_empty() {
            return Err(CoreError::InvalidConfig(
                "at least one upstream must be configured".into(),
            ));
        }
        if self.edns_subnet_prefix_v4 > 32 || self.edns_subnet_prefix_v6 > 128 {
            return Err(CoreError::InvalidConfig(
                "EDNS client subnet prefix out of range".into(),
            ));
        }
        Ok(())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            upstreams: default_upstreams(),
            bootstrap: default_bootstrap(),
            mode: UpstreamMode::default(),
            timeout_ms: default_timeout_ms(),
            probe_window_ms: default_probe_window_ms(),
            edns_client_subnet: false,
            edns_subnet_prefix_v4: default_ecs_v4(),
            edns_subnet_prefix_v6: default_ecs_v6(),
        }
    }
}

fn default_upstreams() -> Vec<String> {
    vec!["udp://9.9.9.9:53".to_string(), "udp://1.1.1.1:53".to_string()]
}

fn default_bootstrap() -> Vec<String> {
    vec!["9.9.9.10:53".to_string(), "1.1.1.1:53".to_string()]
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_probe_window_ms() -> u64 {
    1_000
}

fn default_ecs_v4() -> u8 {
    24
}

fn default_ecs_v6() -> u8 {
    56
}
