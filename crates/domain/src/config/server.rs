use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// Listener and working-directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: Vec<String>,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Appended to bare hostnames learned from DHCP/hosts (e.g. `lan`).
    #[serde(default = "default_local_domain")]
    pub local_domain: String,

    /// Address ranges whose PTR lookups answer from the hosts/DHCP view.
    #[serde(default = "default_local_ranges")]
    pub local_ranges: Vec<IpNetwork>,

    /// Per-request total budget, milliseconds.
    #[serde(default = "default_request_budget_ms")]
    pub request_budget_ms: u64,

    /// Master protection switch. Disabling keeps `$dnsrewrite` rules and
    /// hosts/DHCP synthesis active (configuration, not protection).
    #[serde(default = "default_true")]
    pub protection_enabled: bool,

    /// Hostnames the DDR answer advertises for encrypted transports,
    /// as `(scheme, host, port)` templates like `h2:dns.example.net:443`.
    #[serde(default)]
    pub ddr_templates: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            local_domain: default_local_domain(),
            local_ranges: default_local_ranges(),
            request_budget_ms: default_request_budget_ms(),
            protection_enabled: true,
            ddr_templates: vec![],
        }
    }
}

fn default_bind() -> Vec<String> {
    vec!["0.0.0.0:53".to_string()]
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_local_domain() -> String {
    "lan".to_string()
}

fn default_local_ranges() -> Vec<IpNetwork> {
    ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "fd00::/8", "fe80::/10"]
        .iter()
        .filter_map(|net| net.parse().ok())
        .collect()
}

fn default_request_budget_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}
