mod cache;
mod filtering;
mod logging;
mod querylog;
mod server;
mod upstream;

pub use cache::CacheConfig;
pub use filtering::{FilterListSpec, FilteringConfig, SafeBrowsingConfig};
pub use logging::LoggingConfig;
pub use querylog::{QueryLogConfig, StatsConfig};
pub use server::ServerConfig;
pub use upstream::{UpstreamConfig, UpstreamMode};

use crate::access::AccessList;
use crate::client::PersistentClient;
use crate::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The read-only configuration snapshot the core is built from.
///
/// Collaborators (admin API, config loader) construct a new snapshot and hand
/// it to `Core::apply`; the core never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub access: AccessList,

    #[serde(default)]
    pub clients: Vec<PersistentClient>,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub filtering: FilteringConfig,

    #[serde(default)]
    pub querylog: QueryLogConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CoreConfig {
    pub fn from_toml(text: &str) -> Result<Self, CoreError> {
        let config: CoreConfig =
            toml::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Uniqueness checks for persistent clients: no IP and no ClientID may be
    /// claimed by two clients.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen_ips = HashSet::new();
        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();

        for client in &self.clients {
            if !seen_names.insert(client.name.to_ascii_lowercase()) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate client name: {}",
                    client.name
                )));
            }
            for ip in &client.ips {
                if !seen_ips.insert(*ip) {
                    return Err(CoreError::InvalidConfig(format!(
                        "IP {} assigned to more than one client",
                        ip
                    )));
                }
            }
            for id in &client.ids {
                if !seen_ids.insert(id.to_ascii_lowercase()) {
                    return Err(CoreError::InvalidConfig(format!(
                        "ClientID {} assigned to more than one client",
                        id
                    )));
                }
            }
        }

        self.upstream.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_from_empty_toml() {
        let config = CoreConfig::from_toml("").unwrap();
        assert!(config.filtering.enabled);
        assert!(!config.upstream.upstreams.is_empty());
    }

    #[test]
    fn duplicate_client_ip_rejected() {
        let toml = r#"
[[clients]]
name = "one"
ips = ["10.0.0.2"]

[[clients]]
name = "two"
ips = ["10.0.0.2"]
"#;
        assert!(CoreConfig::from_toml(toml).is_err());
    }

    #[test]
    fn duplicate_client_id_rejected_case_insensitive() {
        let toml = r#"
[[clients]]
name = "one"
ids = ["Kid-TV"]

[[clients]]
name = "two"
ids = ["kid-tv"]
"#;
        assert!(CoreConfig::from_toml(toml).is_err());
    }
}
